/// Delay between attempts to start capturing while the scene is not ready
pub const START_RETRY_DELAY_SECS: f32 = 0.5;

/// After this long waiting for the scene, a warning is logged (retries continue)
pub const START_WARNING_TIMEOUT_SECS: f32 = 10.0;

/// Window over which the capture frame rate is averaged
pub const FPS_SAMPLE_WINDOW_SECS: f32 = 1.0;
