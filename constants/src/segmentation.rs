/// Id reserved for objects excluded from segmentation
pub const EXCLUDED_SEGMENTATION_ID: u32 = 0;

/// Highest id representable by the stencil encoding
pub const STENCIL_MAX_ID: u32 = u8::MAX as u32;

/// Highest id representable by the vertex colour encoding
pub const VERTEX_COLOR_MAX_ID: u32 = u32::MAX;
