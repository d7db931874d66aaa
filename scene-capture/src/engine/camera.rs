// Standard library and external crates
use bevy::math::{Mat4, UVec2};
use bevy::prelude::Transform;
use capture_constants::render_settings::{
    DEFAULT_CAPTURE_HEIGHT, DEFAULT_CAPTURE_WIDTH, DEFAULT_HORIZONTAL_FOV_DEGREES,
    DEFAULT_NEAR_CLIP,
};
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

// Crate modules
use crate::error::CaptureError;

/// Capture camera description shared by every extractor of a viewpoint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub horizontal_fov_degrees: f32,
    pub near_clip: f32,
    /// Render colour into a float target.
    pub hdr: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            width: DEFAULT_CAPTURE_WIDTH,
            height: DEFAULT_CAPTURE_HEIGHT,
            horizontal_fov_degrees: DEFAULT_HORIZONTAL_FOV_DEGREES,
            near_clip: DEFAULT_NEAR_CLIP,
            hdr: false,
        }
    }
}

impl CameraSettings {
    pub fn resolution(&self) -> UVec2 {
        UVec2::new(self.width, self.height)
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }

    pub fn horizontal_fov_radians(&self) -> f32 {
        self.horizontal_fov_degrees.to_radians()
    }

    pub fn vertical_fov_radians(&self) -> f32 {
        2.0 * ((self.horizontal_fov_radians() * 0.5).tan() / self.aspect_ratio()).atan()
    }

    /// Reverse-z infinite perspective, the projection Bevy cameras use.
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_infinite_reverse_rh(
            self.vertical_fov_radians(),
            self.aspect_ratio(),
            self.near_clip,
        )
    }

    /// Pinhole intrinsics in pixels, square pixels, no skew.
    pub fn intrinsics(&self) -> CameraIntrinsics {
        let fx = (self.width as f32 * 0.5) / (self.horizontal_fov_radians() * 0.5).tan();
        CameraIntrinsics {
            res_x: self.width,
            res_y: self.height,
            fx,
            fy: fx,
            cx: self.width as f32 * 0.5,
            cy: self.height as f32 * 0.5,
            s: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::InvalidArgument(format!(
                "capture resolution {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        if !(self.horizontal_fov_degrees > 0.0 && self.horizontal_fov_degrees < 180.0) {
            return Err(CaptureError::InvalidArgument(format!(
                "horizontal field of view {} is outside (0, 180)",
                self.horizontal_fov_degrees
            )));
        }
        if !(self.near_clip > 0.0) {
            return Err(CaptureError::InvalidArgument(format!(
                "near clip {} must be positive",
                self.near_clip
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CameraIntrinsics {
    #[serde(rename = "resX")]
    pub res_x: u32,
    #[serde(rename = "resY")]
    pub res_y: u32,
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    pub s: f32,
}

/// Per-frame camera variation for domain randomisation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraRandomization {
    /// Inclusive horizontal field of view range in degrees.
    pub horizontal_fov_range_degrees: Option<[f32; 2]>,
    /// Candidate resolutions; one is picked per frame.
    pub resolutions: Vec<[u32; 2]>,
    pub seed: Option<u64>,
}

impl CameraRandomization {
    pub fn is_enabled(&self) -> bool {
        self.horizontal_fov_range_degrees.is_some() || !self.resolutions.is_empty()
    }

    pub fn apply(&self, base: &CameraSettings, rng: &mut SmallRng) -> CameraSettings {
        let mut camera = *base;
        if let Some([min, max]) = self.horizontal_fov_range_degrees {
            camera.horizontal_fov_degrees = if max > min {
                rng.gen_range(min..=max)
            } else {
                min
            };
        }
        if let Some([width, height]) = self.resolutions.choose(rng) {
            camera.width = *width;
            camera.height = *height;
        }
        camera
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if let Some([min, max]) = self.horizontal_fov_range_degrees {
            if !(min > 0.0 && max < 180.0 && min <= max) {
                return Err(CaptureError::InvalidArgument(format!(
                    "randomised field of view range [{}, {}] is invalid",
                    min, max
                )));
            }
        }
        if self.resolutions.iter().any(|[w, h]| *w == 0 || *h == 0) {
            return Err(CaptureError::InvalidArgument(
                "randomised resolutions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Camera pose and projection for one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewInfo {
    /// World transform of the camera. Looks down its local -Z.
    pub camera: Transform,
    pub projection: Mat4,
    pub size: UVec2,
}

impl ViewInfo {
    pub fn new(camera: Transform, settings: &CameraSettings) -> Self {
        Self {
            camera,
            projection: settings.projection_matrix(),
            size: settings.resolution(),
        }
    }

    pub fn view_from_world(&self) -> Mat4 {
        self.camera.compute_matrix().inverse()
    }

    pub fn clip_from_world(&self) -> Mat4 {
        self.projection * self.view_from_world()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn intrinsics_match_field_of_view() {
        let camera = CameraSettings {
            width: 640,
            height: 480,
            horizontal_fov_degrees: 90.0,
            ..Default::default()
        };
        let intrinsics = camera.intrinsics();
        assert!((intrinsics.fx - 320.0).abs() < 1e-3);
        assert_eq!(intrinsics.cx, 320.0);
        assert_eq!(intrinsics.cy, 240.0);
    }

    #[test]
    fn randomisation_stays_in_range() {
        let randomization = CameraRandomization {
            horizontal_fov_range_degrees: Some([40.0, 60.0]),
            resolutions: vec![[320, 240], [64, 64]],
            seed: Some(3),
        };
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..20 {
            let camera = randomization.apply(&CameraSettings::default(), &mut rng);
            assert!((40.0..=60.0).contains(&camera.horizontal_fov_degrees));
            assert!(camera.width == 320 || camera.width == 64);
        }
    }

    #[test]
    fn zero_resolution_is_rejected() {
        let camera = CameraSettings {
            width: 0,
            ..Default::default()
        };
        assert!(camera.validate().is_err());
    }
}
