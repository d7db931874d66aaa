use capture_constants::capture::FPS_SAMPLE_WINDOW_SECS;

/// Captured frame total and a capture rate averaged over a short window.
#[derive(Debug, Clone, Default)]
pub struct FrameCounter {
    total_frame_count: u64,
    cached_fps: f32,
    accumulated_frames: u32,
    accumulated_secs: f32,
}

impl FrameCounter {
    /// Count one captured frame, `elapsed_secs` after the previous one.
    pub fn record_frame(&mut self, elapsed_secs: f32) {
        self.total_frame_count += 1;
        self.accumulated_frames += 1;
        self.accumulated_secs += elapsed_secs;

        if self.accumulated_secs >= FPS_SAMPLE_WINDOW_SECS {
            self.cached_fps = self.accumulated_frames as f32 / self.accumulated_secs;
            self.accumulated_frames = 0;
            self.accumulated_secs = 0.0;
        }
    }

    pub fn total_frame_count(&self) -> u64 {
        self.total_frame_count
    }

    /// Frames per second over the last full sample window.
    pub fn fps(&self) -> f32 {
        self.cached_fps
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_updates_once_per_window() {
        let mut counter = FrameCounter::default();
        for _ in 0..3 {
            counter.record_frame(0.25);
        }
        assert_eq!(counter.fps(), 0.0);

        counter.record_frame(0.25);
        assert_eq!(counter.fps(), 4.0);
        assert_eq!(counter.total_frame_count(), 4);
    }
}
