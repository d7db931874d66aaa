// Standard library and external crates
use bevy::math::UVec2;
use capture_constants::render_settings::ROW_PITCH_ALIGNMENT;
use half::f16;

// Crate modules
use crate::engine::pixel::PixelFormat;

/// Render target storage as the renderer sees it.
/// Rows are padded to `ROW_PITCH_ALIGNMENT` bytes like a mapped GPU copy buffer,
/// so readers must honour `row_pitch` rather than assume tight packing.
#[derive(Debug, Clone)]
pub struct RenderSurface {
    width: u32,
    height: u32,
    format: PixelFormat,
    row_pitch: usize,
    bytes: Vec<u8>,
}

impl RenderSurface {
    pub fn new(size: UVec2, format: PixelFormat) -> Self {
        let row_pitch = align_row_pitch(size.x as usize * format.bytes_per_pixel());
        Self {
            width: size.x,
            height: size.y,
            format,
            row_pitch,
            bytes: vec![0; row_pitch * size.y as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn row_pitch(&self) -> usize {
        self.row_pitch
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn clear(&mut self) {
        self.bytes.fill(0);
    }

    pub fn pixel(&self, x: u32, y: u32) -> &[u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.row_pitch + x as usize * bpp;
        &self.bytes[start..start + bpp]
    }

    fn pixel_mut(&mut self, x: u32, y: u32) -> &mut [u8] {
        let bpp = self.format.bytes_per_pixel();
        let start = y as usize * self.row_pitch + x as usize * bpp;
        &mut self.bytes[start..start + bpp]
    }

    /// Write a linear colour, encoded for the surface format.
    pub fn write_color(&mut self, x: u32, y: u32, rgba: [f32; 4]) {
        let format = self.format;
        let pixel = self.pixel_mut(x, y);
        match format {
            PixelFormat::Rgba8 => {
                for (dst, value) in pixel.iter_mut().zip(rgba) {
                    *dst = unit_to_u8(value);
                }
            }
            PixelFormat::Bgra8 => {
                let [r, g, b, a] = rgba;
                for (dst, value) in pixel.iter_mut().zip([b, g, r, a]) {
                    *dst = unit_to_u8(value);
                }
            }
            PixelFormat::Rgba16Float => {
                for (dst, value) in pixel.chunks_exact_mut(2).zip(rgba) {
                    dst.copy_from_slice(&f16::from_f32(value).to_le_bytes());
                }
            }
            PixelFormat::Rgba32Float => {
                for (dst, value) in pixel.chunks_exact_mut(4).zip(rgba) {
                    dst.copy_from_slice(&value.to_le_bytes());
                }
            }
            PixelFormat::R8 => pixel[0] = unit_to_u8(luminance(rgba)),
            PixelFormat::R16 => {
                let value = (luminance(rgba).clamp(0.0, 1.0) * u16::MAX as f32).round() as u16;
                pixel.copy_from_slice(&value.to_le_bytes());
            }
            PixelFormat::R16Float => {
                pixel.copy_from_slice(&f16::from_f32(luminance(rgba)).to_le_bytes())
            }
            PixelFormat::R32Float => pixel.copy_from_slice(&luminance(rgba).to_le_bytes()),
            PixelFormat::Rg32Float => {
                pixel[..4].copy_from_slice(&rgba[0].to_le_bytes());
                pixel[4..].copy_from_slice(&rgba[1].to_le_bytes());
            }
        }
    }

    /// Write a scalar such as view depth.
    pub fn write_scalar(&mut self, x: u32, y: u32, value: f32) {
        let format = self.format;
        let pixel = self.pixel_mut(x, y);
        match format {
            PixelFormat::R32Float => pixel.copy_from_slice(&value.to_le_bytes()),
            PixelFormat::R16Float => pixel.copy_from_slice(&f16::from_f32(value).to_le_bytes()),
            PixelFormat::Rg32Float => pixel[..4].copy_from_slice(&value.to_le_bytes()),
            PixelFormat::Rgba32Float => {
                for channel in pixel.chunks_exact_mut(4).take(3) {
                    channel.copy_from_slice(&value.to_le_bytes());
                }
                pixel[12..].copy_from_slice(&1.0f32.to_le_bytes());
            }
            _ => self.write_color(x, y, [value, value, value, 1.0]),
        }
    }

    /// Write a segmentation id, truncated to the width of the surface format.
    pub fn write_id(&mut self, x: u32, y: u32, id: u32) {
        let format = self.format;
        let pixel = self.pixel_mut(x, y);
        match format {
            PixelFormat::R8 => pixel[0] = id as u8,
            PixelFormat::R16 => pixel.copy_from_slice(&(id as u16).to_le_bytes()),
            PixelFormat::Rgba8 => pixel.copy_from_slice(&id.to_be_bytes()),
            PixelFormat::Bgra8 => {
                let [r, g, b, a] = id.to_be_bytes();
                pixel.copy_from_slice(&[b, g, r, a]);
            }
            PixelFormat::R32Float => pixel.copy_from_slice(&(id as f32).to_le_bytes()),
            _ => self.write_scalar(x, y, id as f32),
        }
    }
}

fn align_row_pitch(bytes: usize) -> usize {
    bytes.div_ceil(ROW_PITCH_ALIGNMENT) * ROW_PITCH_ALIGNMENT
}

fn unit_to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn luminance([r, g, b, _]: [f32; 4]) -> f32 {
    0.2126 * r + 0.7152 * g + 0.0722 * b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_are_padded_to_alignment() {
        let surface = RenderSurface::new(UVec2::new(10, 3), PixelFormat::Rgba8);
        assert_eq!(surface.row_pitch(), ROW_PITCH_ALIGNMENT);
        assert_eq!(surface.bytes().len(), ROW_PITCH_ALIGNMENT * 3);
    }

    #[test]
    fn bgra_surface_swizzles_colour() {
        let mut surface = RenderSurface::new(UVec2::new(1, 1), PixelFormat::Bgra8);
        surface.write_color(0, 0, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(surface.pixel(0, 0), &[0, 0, 255, 255]);
    }

    #[test]
    fn ids_truncate_to_stencil_width() {
        let mut surface = RenderSurface::new(UVec2::new(1, 1), PixelFormat::R8);
        surface.write_id(0, 0, 257);
        assert_eq!(surface.pixel(0, 0), &[1]);
    }
}
