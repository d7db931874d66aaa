//! CPU-side pixel storage produced by readback and consumed by the exporter.

// Standard library and external crates
use serde::{Deserialize, Serialize};

// Crate modules
use crate::error::CaptureError;

/// Pixel layouts a render surface or readback buffer can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8,
    Bgra8,
    R8,
    R16,
    R16Float,
    R32Float,
    Rgba16Float,
    Rgba32Float,
    Rg32Float,
}

impl PixelFormat {
    pub fn channel_count(self) -> usize {
        match self {
            Self::R8 | Self::R16 | Self::R16Float | Self::R32Float => 1,
            Self::Rg32Float => 2,
            Self::Rgba8 | Self::Bgra8 | Self::Rgba16Float | Self::Rgba32Float => 4,
        }
    }

    /// Bytes per channel.
    pub fn byte_depth(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 | Self::R8 => 1,
            Self::R16 | Self::R16Float | Self::Rgba16Float => 2,
            Self::R32Float | Self::Rgba32Float | Self::Rg32Float => 4,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.channel_count() * self.byte_depth()
    }

    /// Formats the image encoders accept without conversion.
    pub fn is_exportable(self) -> bool {
        matches!(self, Self::Rgba8 | Self::Bgra8 | Self::R8 | Self::R16)
    }

    /// Exportable format a surface of this format is read back into.
    ///
    /// Float formats keep their information: single channel floats are bit
    /// packed into an integer container of the same width, colour floats
    /// are clamped into 8 bits per channel.
    pub fn export_format(self) -> Result<PixelFormat, CaptureError> {
        match self {
            Self::Rgba8 | Self::Bgra8 | Self::R8 | Self::R16 => Ok(self),
            Self::R32Float | Self::Rgba16Float | Self::Rgba32Float => Ok(Self::Rgba8),
            Self::R16Float => Ok(Self::R16),
            Self::Rg32Float => Err(CaptureError::UnsupportedPixelFormat(self)),
        }
    }

    /// Whether readback can convert a surface of this format into `target`.
    pub fn converts_to(self, target: PixelFormat) -> bool {
        if self == target {
            return target.is_exportable();
        }

        matches!(
            (self, target),
            (Self::Bgra8, Self::Rgba8)
                | (Self::Rgba8, Self::Bgra8)
                | (Self::R32Float, Self::Rgba8)
                | (Self::R32Float, Self::R16)
                | (Self::R16Float, Self::R16)
                | (Self::Rgba16Float, Self::Rgba8)
                | (Self::Rgba32Float, Self::Rgba8)
        )
    }
}

/// Owned pixel rows. Moves between pipeline stages, never shared.
///
/// Invariant: `bytes.len() == row_stride * height` and
/// `row_stride >= width * format.bytes_per_pixel()`.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    row_stride: usize,
    format: PixelFormat,
}

impl PixelBuffer {
    /// Zero-initialised, tightly packed buffer.
    pub fn zeroed(width: u32, height: u32, format: PixelFormat) -> Self {
        let row_stride = width as usize * format.bytes_per_pixel();
        Self {
            bytes: vec![0; row_stride * height as usize],
            width,
            height,
            row_stride,
            format,
        }
    }

    pub fn from_bytes(
        width: u32,
        height: u32,
        row_stride: usize,
        format: PixelFormat,
        bytes: Vec<u8>,
    ) -> Result<Self, CaptureError> {
        if row_stride < width as usize * format.bytes_per_pixel() {
            return Err(CaptureError::InvalidArgument(format!(
                "row stride {} too small for {} {:?} pixels",
                row_stride, width, format
            )));
        }
        if bytes.len() != row_stride * height as usize {
            return Err(CaptureError::InvalidArgument(format!(
                "expected {} bytes, got {}",
                row_stride * height as usize,
                bytes.len()
            )));
        }

        Ok(Self {
            bytes,
            width,
            height,
            row_stride,
            format,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn byte_depth(&self) -> usize {
        self.format.byte_depth()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Pixel bytes of row `y`, without stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.row_stride;
        &self.bytes[start..start + self.width as usize * self.format.bytes_per_pixel()]
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.row_stride + x as usize * bpp;
        &self.bytes[start..start + bpp]
    }

    /// Copy of the pixel rows with stride padding removed.
    pub fn packed_bytes(&self) -> Vec<u8> {
        if self.row_stride == self.width as usize * self.format.bytes_per_pixel() {
            return self.bytes.clone();
        }

        let mut packed =
            Vec::with_capacity(self.width as usize * self.height as usize * self.format.bytes_per_pixel());
        for y in 0..self.height {
            packed.extend_from_slice(self.row(y));
        }
        packed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_red_maps_to_four_channel_bytes() {
        assert_eq!(PixelFormat::R32Float.export_format().unwrap(), PixelFormat::Rgba8);
        assert_eq!(
            PixelFormat::R32Float.bytes_per_pixel(),
            PixelFormat::Rgba8.bytes_per_pixel()
        );
    }

    #[test]
    fn two_channel_float_is_not_exportable() {
        assert!(matches!(
            PixelFormat::Rg32Float.export_format(),
            Err(CaptureError::UnsupportedPixelFormat(PixelFormat::Rg32Float))
        ));
    }

    #[test]
    fn from_bytes_enforces_stride_invariant() {
        assert!(PixelBuffer::from_bytes(4, 2, 8, PixelFormat::Rgba8, vec![0; 16]).is_err());
        assert!(PixelBuffer::from_bytes(4, 2, 16, PixelFormat::Rgba8, vec![0; 30]).is_err());

        let buffer = PixelBuffer::from_bytes(2, 2, 12, PixelFormat::Rgba8, vec![7; 24]).unwrap();
        assert_eq!(buffer.row(1).len(), 8);
        assert_eq!(buffer.packed_bytes().len(), 16);
    }
}
