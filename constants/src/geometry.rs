/// Power iterations used to find the dominant axis of a mesh
pub const POWER_ITERATION_COUNT: usize = 32;

/// Vertices per parallel chunk when accumulating mesh statistics
pub const VERTEX_CHUNK_SIZE: usize = 4096;

/// Lengths below this are treated as degenerate
pub const GEOMETRY_EPSILON: f32 = 1e-6;
