//! Pixel buffer to image file encoding.

// Standard library and external crates
use std::fs;
use std::io::Cursor;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{
    DynamicImage, GrayImage, ImageBuffer, ImageEncoder, ImageOutputFormat, Luma, RgbaImage,
};
use scene_capture::config::ImageFormat;
use scene_capture::engine::pixel::{PixelBuffer, PixelFormat};

// Crate modules
use crate::error::ExportError;

/// Encodes pixel buffers into one configured image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageCompressor {
    format: ImageFormat,
    jpeg_quality: u8,
}

impl ImageCompressor {
    pub fn new(format: ImageFormat, jpeg_quality: u8) -> Self {
        Self {
            format,
            jpeg_quality: jpeg_quality.clamp(1, 100),
        }
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    /// Encode into memory.
    ///
    /// PNG goes straight to the encoder at its fastest setting, unfiltered.
    /// JPEG and BMP go through `DynamicImage`, which narrows channels the
    /// format cannot hold (alpha for JPEG, 16-bit grey for both).
    pub fn compress(&self, pixels: &PixelBuffer) -> Result<Vec<u8>, ExportError> {
        let image = to_dynamic_image(pixels)?;
        let mut encoded = Vec::new();

        match self.format {
            ImageFormat::Png => {
                PngEncoder::new_with_quality(
                    &mut encoded,
                    CompressionType::Fast,
                    FilterType::NoFilter,
                )
                .write_image(image.as_bytes(), image.width(), image.height(), image.color())?;
            }
            ImageFormat::Jpeg => {
                let image = match image {
                    DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => {
                        DynamicImage::ImageLuma8(image.to_luma8())
                    }
                    _ => DynamicImage::ImageRgb8(image.to_rgb8()),
                };
                image.write_to(
                    &mut Cursor::new(&mut encoded),
                    ImageOutputFormat::Jpeg(self.jpeg_quality),
                )?;
            }
            ImageFormat::Bmp => {
                let image = match image {
                    DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
                    other => other,
                };
                image.write_to(&mut Cursor::new(&mut encoded), ImageOutputFormat::Bmp)?;
            }
        }
        Ok(encoded)
    }

    /// Encode and write to `path`, creating missing parent directories.
    pub fn write(&self, pixels: &PixelBuffer, path: &Path) -> Result<(), ExportError> {
        let encoded = self.compress(pixels)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ExportError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, encoded).map_err(|source| ExportError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Wrap the packed pixel rows in an image of the matching colour type.
fn to_dynamic_image(pixels: &PixelBuffer) -> Result<DynamicImage, ExportError> {
    let (width, height) = (pixels.width(), pixels.height());
    let mut packed = pixels.packed_bytes();

    let image = match pixels.format() {
        PixelFormat::Rgba8 => RgbaImage::from_raw(width, height, packed).map(DynamicImage::ImageRgba8),
        PixelFormat::Bgra8 => {
            for pixel in packed.chunks_exact_mut(4) {
                pixel.swap(0, 2);
            }
            RgbaImage::from_raw(width, height, packed).map(DynamicImage::ImageRgba8)
        }
        PixelFormat::R8 => GrayImage::from_raw(width, height, packed).map(DynamicImage::ImageLuma8),
        PixelFormat::R16 => {
            let values: Vec<u16> = packed
                .chunks_exact(2)
                .map(|bytes| u16::from_le_bytes([bytes[0], bytes[1]]))
                .collect();
            ImageBuffer::<Luma<u16>, Vec<u16>>::from_raw(width, height, values)
                .map(DynamicImage::ImageLuma16)
        }
        other => return Err(ExportError::UnsupportedPixelFormat(other)),
    };

    image.ok_or(ExportError::BufferSize { width, height })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bgra_red(width: u32, height: u32) -> PixelBuffer {
        // Padded stride, like a GPU readback.
        let stride = width as usize * 4 + 8;
        let mut bytes = vec![0u8; stride * height as usize];
        for y in 0..height as usize {
            for x in 0..width as usize {
                let start = y * stride + x * 4;
                bytes[start..start + 4].copy_from_slice(&[0, 0, 255, 255]);
            }
        }
        PixelBuffer::from_bytes(width, height, stride, PixelFormat::Bgra8, bytes).unwrap()
    }

    #[test]
    fn png_swizzles_bgra_and_drops_padding() {
        let compressor = ImageCompressor::new(ImageFormat::Png, 90);
        let encoded = compressor.compress(&bgra_red(3, 2)).unwrap();

        let decoded = image::load_from_memory(&encoded).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (3, 2));
        assert_eq!(decoded.get_pixel(2, 1).0, [255, 0, 0, 255]);
    }

    #[test]
    fn png_keeps_sixteen_bit_depth() {
        let mut bytes = Vec::new();
        for value in [0u16, 1234, 65535, 7] {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        let pixels = PixelBuffer::from_bytes(2, 2, 4, PixelFormat::R16, bytes).unwrap();

        let encoded = ImageCompressor::new(ImageFormat::Png, 90).compress(&pixels).unwrap();
        let decoded = image::load_from_memory(&encoded).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L16);
        let decoded = decoded.to_luma16();
        assert_eq!(decoded.get_pixel(1, 0).0, [1234]);
        assert_eq!(decoded.get_pixel(0, 1).0, [65535]);
    }

    #[test]
    fn jpeg_and_bmp_accept_every_exportable_format() {
        let grey = PixelBuffer::zeroed(4, 4, PixelFormat::R8);
        let deep = PixelBuffer::zeroed(4, 4, PixelFormat::R16);
        for format in [ImageFormat::Jpeg, ImageFormat::Bmp] {
            let compressor = ImageCompressor::new(format, 75);
            for pixels in [&bgra_red(4, 4), &grey, &deep] {
                let encoded = compressor.compress(pixels).unwrap();
                assert!(!encoded.is_empty(), "{:?} {:?}", format, pixels.format());
            }
        }
    }

    #[test]
    fn float_buffers_are_rejected() {
        let pixels = PixelBuffer::zeroed(2, 2, PixelFormat::R32Float);
        assert!(matches!(
            ImageCompressor::new(ImageFormat::Png, 90).compress(&pixels),
            Err(ExportError::UnsupportedPixelFormat(PixelFormat::R32Float))
        ));
    }
}
