// Standard library and external crates
use bevy::log::warn;
use bevy::math::{URect, UVec2};
use capture_constants::render_settings::DEPTH_QUANTIZE_SCALE;
use crossbeam::channel::{self, Sender};
use half::f16;

// Crate modules
use super::{PixelBuffer, PixelFormat};
use crate::engine::render::{
    ReadbackResult, ReadbackTicket, RenderCommand, RenderQueue, RenderSurface, RenderTargetId,
};
use crate::error::CaptureError;

/// Region, format and size a readback copies out of its source surface.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReadbackRequest {
    /// Sub-rectangle of the source; the whole surface when `None`.
    pub region: Option<URect>,
    /// Destination format; the source's export mapping when `None`.
    pub format: Option<PixelFormat>,
    /// Destination size; the region size when `None`.
    pub size: Option<UVec2>,
}

/// Reads the contents of one render target back to the CPU.
#[derive(Debug, Clone, Default)]
pub struct TextureReader {
    source: Option<RenderTargetId>,
    request: ReadbackRequest,
}

impl TextureReader {
    /// Bind the reader to a target. Later reads copy from it.
    pub fn set_source(
        &mut self,
        target: RenderTargetId,
        region: Option<URect>,
        format: Option<PixelFormat>,
        size: Option<UVec2>,
    ) {
        self.source = Some(target);
        self.request = ReadbackRequest {
            region,
            format,
            size,
        };
    }

    pub fn clear_source(&mut self) {
        self.source = None;
    }

    pub fn source(&self) -> Option<RenderTargetId> {
        self.source
    }

    pub fn request(&self) -> &ReadbackRequest {
        &self.request
    }

    /// Blocking readback. Waits for every render command queued before it.
    pub fn read_sync(&self, queue: &RenderQueue) -> Option<PixelBuffer> {
        let target = self.source?;
        let (reply, receiver) = channel::bounded(1);
        let submitted = queue.submit(RenderCommand::Readback {
            target,
            request: self.request,
            ticket: ReadbackTicket::default(),
            reply,
        });
        if !submitted {
            return None;
        }

        match receiver.recv() {
            Ok(ReadbackResult {
                pixels: Ok(pixels), ..
            }) => Some(pixels),
            Ok(ReadbackResult { pixels: Err(e), .. }) => {
                warn!("Synchronous readback failed: {}", e);
                None
            }
            Err(_) => None,
        }
    }

    /// Queue a readback whose result is sent to `reply` tagged with `ticket`.
    /// Returns false when nothing was queued.
    pub fn read_async(
        &self,
        queue: &RenderQueue,
        ticket: ReadbackTicket,
        reply: &Sender<ReadbackResult>,
    ) -> bool {
        let Some(target) = self.source else {
            return false;
        };

        queue.submit(RenderCommand::Readback {
            target,
            request: self.request,
            ticket,
            reply: reply.clone(),
        })
    }
}

/// Copy a surface into a tightly packed pixel buffer.
///
/// Rows are copied up to the smaller of source and destination width, for
/// the smaller of the two heights. Anything outside that stays zero.
pub fn copy_surface(
    surface: &RenderSurface,
    request: &ReadbackRequest,
) -> Result<PixelBuffer, CaptureError> {
    let source_format = surface.format();
    let target_format = match request.format {
        Some(format) => format,
        None => source_format.export_format()?,
    };
    if !source_format.converts_to(target_format) {
        return Err(CaptureError::UnsupportedPixelFormat(source_format));
    }

    let bounds = URect::from_corners(UVec2::ZERO, surface.size());
    let region = request
        .region
        .map_or(bounds, |region| region.intersect(bounds));
    let region_size = region.size();
    let size = request.size.unwrap_or(region_size);

    let mut buffer = PixelBuffer::zeroed(size.x, size.y, target_format);
    let copy_width = size.x.min(region_size.x) as usize;
    let copy_height = size.y.min(region_size.y);

    let source_bpp = source_format.bytes_per_pixel();
    let target_bpp = target_format.bytes_per_pixel();
    let target_stride = buffer.row_stride();

    for y in 0..copy_height {
        let row_start = (region.min.y + y) as usize * surface.row_pitch()
            + region.min.x as usize * source_bpp;
        let source_row = &surface.bytes()[row_start..row_start + copy_width * source_bpp];
        let target_start = y as usize * target_stride;
        let target_row =
            &mut buffer.bytes_mut()[target_start..target_start + copy_width * target_bpp];

        if source_format == target_format {
            target_row.copy_from_slice(source_row);
            continue;
        }

        for (source, target) in source_row
            .chunks_exact(source_bpp)
            .zip(target_row.chunks_exact_mut(target_bpp))
        {
            convert_pixel(source_format, target_format, source, target);
        }
    }

    Ok(buffer)
}

fn convert_pixel(from: PixelFormat, to: PixelFormat, source: &[u8], target: &mut [u8]) {
    match (from, to) {
        (PixelFormat::Bgra8, PixelFormat::Rgba8) | (PixelFormat::Rgba8, PixelFormat::Bgra8) => {
            target.copy_from_slice(&[source[2], source[1], source[0], source[3]]);
        }
        // Bit pack: consumers reinterpret the four bytes as a little-endian f32.
        (PixelFormat::R32Float, PixelFormat::Rgba8) => target.copy_from_slice(source),
        (PixelFormat::R32Float, PixelFormat::R16) => {
            let value = f32::from_le_bytes([source[0], source[1], source[2], source[3]]);
            // NaN casts to 0.
            let quantized = (value * DEPTH_QUANTIZE_SCALE).round().clamp(0.0, u16::MAX as f32) as u16;
            target.copy_from_slice(&quantized.to_le_bytes());
        }
        (PixelFormat::R16Float, PixelFormat::R16) => target.copy_from_slice(source),
        (PixelFormat::Rgba16Float, PixelFormat::Rgba8) => {
            for (channel, dst) in source.chunks_exact(2).zip(target.iter_mut()) {
                let value = f16::from_le_bytes([channel[0], channel[1]]).to_f32();
                *dst = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
        (PixelFormat::Rgba32Float, PixelFormat::Rgba8) => {
            for (channel, dst) in source.chunks_exact(4).zip(target.iter_mut()) {
                let value = f32::from_le_bytes([channel[0], channel[1], channel[2], channel[3]]);
                *dst = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
            }
        }
        _ => target.fill(0),
    }
}
