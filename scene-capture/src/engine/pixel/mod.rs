mod buffer;
mod texture_reader;

pub use buffer::{PixelBuffer, PixelFormat};
pub use texture_reader::{copy_surface, ReadbackRequest, TextureReader};
