// Standard library and external crates
use std::path::PathBuf;

use capture_constants::output::FRAME_INDEX_WIDTH;
use serde::Serialize;

// Crate modules
use super::annotation::{CameraDescription, ExportedObject, FrameAnnotation};
use super::extractor::ExtractorKind;
use crate::config::OutputSettings;
use crate::engine::pixel::PixelBuffer;
use crate::error::CaptureError;

/// Where a piece of captured data came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrameInfo {
    pub frame_index: u64,
    pub viewpoint_name: String,
    pub viewpoint_postfix: String,
    pub extractor_name: String,
    pub extractor_postfix: String,
    pub kind: ExtractorKind,
}

impl CapturedFrameInfo {
    /// `000042[.viewpoint][.extractor].ext`, empty postfixes are skipped.
    pub fn file_name(&self, extension: &str) -> String {
        let mut name = format!("{:0width$}", self.frame_index, width = FRAME_INDEX_WIDTH);
        for postfix in [&self.viewpoint_postfix, &self.extractor_postfix] {
            if !postfix.is_empty() {
                name.push('.');
                name.push_str(postfix);
            }
        }
        name.push('.');
        name.push_str(extension);
        name
    }
}

/// Everything a data handler needs to know when a capture session begins.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSession {
    pub capturer_name: String,
    /// Set when a scene manager drives the capture.
    pub marker_name: Option<String>,
    pub output: OutputSettings,
    pub cameras: Vec<CameraDescription>,
    pub objects: Vec<ExportedObject>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ObjectSettingsFile<'a> {
    pub exported_object_classes: Vec<&'a str>,
    pub exported_objects: &'a [ExportedObject],
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraSettingsFile<'a> {
    pub camera_settings: &'a [CameraDescription],
}

impl CaptureSession {
    /// `<root>/<capturer>[/<marker>]`
    pub fn directory(&self) -> PathBuf {
        let mut directory = self.output.root_directory.join(&self.capturer_name);
        if let Some(marker) = &self.marker_name {
            directory.push(marker);
        }
        directory
    }

    /// Sorted, de-duplicated class names of the exported objects.
    pub fn exported_classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.objects.iter().map(|o| o.class.as_str()).collect();
        classes.sort_unstable();
        classes.dedup();
        classes
    }

    pub fn object_settings(&self) -> ObjectSettingsFile<'_> {
        ObjectSettingsFile {
            exported_object_classes: self.exported_classes(),
            exported_objects: &self.objects,
        }
    }

    pub fn camera_settings(&self) -> CameraSettingsFile<'_> {
        CameraSettingsFile {
            camera_settings: &self.cameras,
        }
    }
}

/// Sink for captured data.
///
/// Called on the main thread only. Implementations must not block; heavy
/// work such as compression belongs on a worker they own.
pub trait DataHandler: Send + Sync {
    fn on_start_capturing(&mut self, session: &CaptureSession) -> Result<(), CaptureError>;

    fn on_stop_capturing(&mut self);

    /// Backpressure signal. While false the capturer pauses simulation time.
    fn can_handle_more_data(&self) -> bool;

    /// True while accepted data is still being processed.
    fn is_handling_data(&self) -> bool;

    fn handle_pixel_data(&mut self, pixels: PixelBuffer, frame: &CapturedFrameInfo);

    fn handle_annotation_data(&mut self, annotation: &FrameAnnotation, frame: &CapturedFrameInfo);

    /// Writes that failed since the session started.
    fn failure_count(&self) -> u32 {
        0
    }
}

/// Optional tap on captured data, e.g. an on-screen preview.
pub trait CaptureObserver: Send + Sync {
    fn on_pixel_data(&mut self, _pixels: &PixelBuffer, _frame: &CapturedFrameInfo) {}

    fn on_annotation_data(&mut self, _annotation: &FrameAnnotation, _frame: &CapturedFrameInfo) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(viewpoint: &str, extractor: &str) -> CapturedFrameInfo {
        CapturedFrameInfo {
            frame_index: 42,
            viewpoint_name: "vp".to_string(),
            viewpoint_postfix: viewpoint.to_string(),
            extractor_name: "rgb".to_string(),
            extractor_postfix: extractor.to_string(),
            kind: ExtractorKind::Rgb,
        }
    }

    #[test]
    fn file_names_skip_empty_postfixes() {
        assert_eq!(frame("", "").file_name("png"), "000042.png");
        assert_eq!(frame("left", "").file_name("json"), "000042.left.json");
        assert_eq!(frame("", "depth").file_name("png"), "000042.depth.png");
        assert_eq!(frame("right", "cs").file_name("png"), "000042.right.cs.png");
    }
}
