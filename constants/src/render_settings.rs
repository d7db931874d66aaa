/// Default capture resolution
pub const DEFAULT_CAPTURE_WIDTH: u32 = 640;
pub const DEFAULT_CAPTURE_HEIGHT: u32 = 480;

/// Default horizontal field of view in degrees
pub const DEFAULT_HORIZONTAL_FOV_DEGREES: f32 = 90.0;

/// Default near clip plane in world units
pub const DEFAULT_NEAR_CLIP: f32 = 0.1;

/// Render target rows are padded to this many bytes, like GPU copy buffers
pub const ROW_PITCH_ALIGNMENT: usize = 256;

/// World units to centimetres when depth is quantised to 16 bits
pub const DEPTH_QUANTIZE_SCALE: f32 = 100.0;

/// Direction of the single directional light used by the software rasteriser
pub const LIGHT_DIRECTION: [f32; 3] = [-0.4, -1.0, -0.3];

/// Ambient term added to Lambert shading
pub const AMBIENT_LIGHT: f32 = 0.25;

/// Clip-space w below which a vertex counts as behind the camera
pub const MIN_CLIP_W: f32 = 1e-4;
