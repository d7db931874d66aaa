//! Capturer configuration, loaded from JSON and patched from the command line.
mod overrides;

pub use overrides::CommandLineOverrides;

use std::fs;
use std::path::{Path, PathBuf};

use capture_constants::output::{
    DEFAULT_JPEG_QUALITY, DEFAULT_MAX_QUEUED_IMAGES, DEFAULT_OUTPUT_DIRECTORY,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::camera::{CameraRandomization, CameraSettings};
use crate::engine::capture::{ExtractorKind, FeatureExtractorSettings, ViewpointSettings};
use crate::engine::segmentation::SegmentationSettings;
use crate::error::CaptureError;

/// What to do when a session directory already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DirectoryConflictPolicy {
    /// Delete its contents first.
    CleanDirectory,
    /// Write into a sibling directory suffixed with the current timestamp.
    /// The postfix is only added when the requested directory already
    /// exists; otherwise it is created and used as is.
    CreateNewDirectoryWithTimestampPostfix,
    #[default]
    OverwriteExistingFiles,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Bmp,
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub root_directory: PathBuf,
    pub directory_conflict: DirectoryConflictPolicy,
    pub image_format: ImageFormat,
    pub jpeg_quality: u8,
    /// Export queue bound. Capture throttles once half of it is in use.
    pub max_queued_images: u32,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            root_directory: PathBuf::from(DEFAULT_OUTPUT_DIRECTORY),
            directory_conflict: DirectoryConflictPolicy::default(),
            image_format: ImageFormat::default(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_queued_images: DEFAULT_MAX_QUEUED_IMAGES,
        }
    }
}

/// Full configuration of one scene capturer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapturerSettings {
    /// Inactive capturers never leave `NotActive`.
    pub active: bool,
    /// Start without waiting for a scene manager.
    pub auto_start: bool,
    /// Frames per session, 0 for unlimited.
    pub max_frames: u32,
    /// Simulation seconds between captures, 0 to capture every tick.
    pub capture_interval_secs: f32,
    pub camera: CameraSettings,
    pub camera_randomization: Option<CameraRandomization>,
    /// Extractors used by viewpoints without an override.
    pub feature_extractors: Vec<FeatureExtractorSettings>,
    pub viewpoints: Vec<ViewpointSettings>,
    pub segmentation: SegmentationSettings,
    pub output: OutputSettings,
}

impl Default for CapturerSettings {
    fn default() -> Self {
        Self {
            active: true,
            auto_start: true,
            max_frames: 0,
            capture_interval_secs: 0.0,
            camera: CameraSettings::default(),
            camera_randomization: None,
            feature_extractors: vec![
                FeatureExtractorSettings::new(ExtractorKind::Rgb),
                FeatureExtractorSettings::new(ExtractorKind::ObjectAnnotations),
            ],
            viewpoints: vec![ViewpointSettings::default()],
            segmentation: SegmentationSettings::default(),
            output: OutputSettings::default(),
        }
    }
}

impl CapturerSettings {
    pub fn from_json_str(json: &str) -> Result<Self, CaptureError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, CaptureError> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }

    /// Deep-merge a JSON patch over these settings. Objects merge per key,
    /// everything else is replaced.
    pub fn merged_with(&self, patch: Value) -> Result<Self, CaptureError> {
        let mut base = serde_json::to_value(self)?;
        merge_json(&mut base, patch);
        Ok(serde_json::from_value(base)?)
    }

    pub fn merged_with_file(&self, path: &Path) -> Result<Self, CaptureError> {
        let patch: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
        self.merged_with(patch)
    }

    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(self.capture_interval_secs >= 0.0 && self.capture_interval_secs.is_finite()) {
            return Err(CaptureError::InvalidArgument(format!(
                "capture interval {} must be a finite, non-negative number of seconds",
                self.capture_interval_secs
            )));
        }
        self.camera.validate()?;
        if let Some(randomization) = &self.camera_randomization {
            randomization.validate()?;
        }

        let enabled: Vec<&ViewpointSettings> =
            self.viewpoints.iter().filter(|v| v.enabled).collect();
        if enabled.is_empty() {
            return Err(CaptureError::InvalidArgument(
                "at least one enabled viewpoint is required".to_string(),
            ));
        }
        for viewpoint in enabled {
            if let Some(camera) = &viewpoint.camera_override {
                camera.validate()?;
            }
            let extractors = viewpoint
                .feature_extractors_override
                .as_ref()
                .unwrap_or(&self.feature_extractors);
            if extractors.is_empty() {
                return Err(CaptureError::InvalidArgument(format!(
                    "viewpoint `{}` has no feature extractors",
                    viewpoint.display_name
                )));
            }
        }

        if self.output.max_queued_images < 2 {
            return Err(CaptureError::InvalidArgument(
                "max_queued_images must be at least 2".to_string(),
            ));
        }
        if !(1..=100).contains(&self.output.jpeg_quality) {
            return Err(CaptureError::InvalidArgument(format!(
                "jpeg quality {} is outside 1-100",
                self.output.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Recursive JSON merge used for settings files layered over defaults.
pub fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        CapturerSettings::default().validate().unwrap();
    }

    #[test]
    fn merge_keeps_unpatched_keys() {
        let settings = CapturerSettings::default()
            .merged_with(json!({
                "max_frames": 12,
                "camera": { "width": 128 },
                "output": { "image_format": "jpeg" }
            }))
            .unwrap();

        assert_eq!(settings.max_frames, 12);
        assert_eq!(settings.camera.width, 128);
        assert_eq!(settings.camera.height, CameraSettings::default().height);
        assert_eq!(settings.output.image_format, ImageFormat::Jpeg);
        assert_eq!(settings.viewpoints.len(), 1);
    }

    #[test]
    fn merge_replaces_arrays() {
        let settings = CapturerSettings::default()
            .merged_with(json!({ "feature_extractors": [ { "kind": "stencil_mask" } ] }))
            .unwrap();
        assert_eq!(settings.feature_extractors.len(), 1);
        assert_eq!(settings.feature_extractors[0].kind, ExtractorKind::StencilMask);
    }

    #[test]
    fn validation_rejects_empty_extractor_list() {
        let settings = CapturerSettings {
            feature_extractors: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CaptureError::InvalidArgument(_))
        ));
    }

    #[test]
    fn settings_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capturer.json");
        fs::write(&path, r#"{ "max_frames": 5, "auto_start": false }"#).unwrap();

        let settings = CapturerSettings::load(&path).unwrap();
        assert_eq!(settings.max_frames, 5);
        assert!(!settings.auto_start);
        assert!(settings.active);
    }
}
