// Standard library and external crates
use std::fs;
use std::path::{Path, PathBuf};

use bevy::log::{error, info, warn};
use capture_constants::output::{
    ANNOTATION_EXTENSION, CAMERA_SETTINGS_FILE_NAME, EXPORT_QUEUE_HARD_LIMIT_FACTOR,
    OBJECT_SETTINGS_FILE_NAME,
};
use scene_capture::config::OutputSettings;
use scene_capture::engine::capture::{
    CaptureSession, CapturedFrameInfo, DataHandler, FrameAnnotation,
};
use scene_capture::engine::pixel::PixelBuffer;
use scene_capture::error::CaptureError;
use serde::Serialize;

// Crate modules
use crate::compressor::ImageCompressor;
use crate::directory::prepare_session_directory;
use crate::exporter::ImageExporter;

#[derive(Debug, Clone)]
struct ActiveSession {
    directory: PathBuf,
    output: OutputSettings,
}

/// Writes captured images through the background exporter and annotations
/// as JSON, one directory per capture session.
#[derive(Default)]
pub struct FileDataHandler {
    session: Option<ActiveSession>,
    exporter: Option<ImageExporter>,
    write_failures: u32,
    annotations_written: u64,
}

impl FileDataHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Directory of the current or last session.
    pub fn session_directory(&self) -> Option<&Path> {
        self.session.as_ref().map(|session| session.directory.as_path())
    }

    pub fn pending_images(&self) -> u32 {
        self.exporter.as_ref().map_or(0, ImageExporter::pending_count)
    }

    pub fn images_written(&self) -> u64 {
        self.exporter.as_ref().map_or(0, ImageExporter::written_count)
    }

    pub fn annotations_written(&self) -> u64 {
        self.annotations_written
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CaptureError> {
    let json = serde_json::to_vec_pretty(value)?;
    fs::write(path, json).map_err(|source| CaptureError::DiskWriteFailure {
        path: path.to_path_buf(),
        source,
    })
}

impl DataHandler for FileDataHandler {
    fn on_start_capturing(&mut self, session: &CaptureSession) -> Result<(), CaptureError> {
        // A previous session's exporter finishes its queue before we reuse paths.
        if let Some(mut exporter) = self.exporter.take() {
            exporter.join();
        }

        let requested = session.directory();
        let directory = prepare_session_directory(&requested, session.output.directory_conflict)
            .map_err(|source| CaptureError::DiskWriteFailure {
                path: requested.clone(),
                source,
            })?;

        write_json(&directory.join(OBJECT_SETTINGS_FILE_NAME), &session.object_settings())?;
        write_json(&directory.join(CAMERA_SETTINGS_FILE_NAME), &session.camera_settings())?;

        let compressor =
            ImageCompressor::new(session.output.image_format, session.output.jpeg_quality);
        // Throttling starts at half the soft bound; the hard bound only catches
        // bursts larger than that headroom.
        let hard_limit = session.output.max_queued_images * EXPORT_QUEUE_HARD_LIMIT_FACTOR;
        let exporter = ImageExporter::spawn(compressor, hard_limit as usize)
            .map_err(|e| e.into_capture_error(&directory))?;

        info!("→ Writing `{}` to {}", session.capturer_name, directory.display());
        self.exporter = Some(exporter);
        self.session = Some(ActiveSession {
            directory,
            output: session.output.clone(),
        });
        self.write_failures = 0;
        self.annotations_written = 0;
        Ok(())
    }

    fn on_stop_capturing(&mut self) {
        if let Some(exporter) = self.exporter.as_mut() {
            exporter.stop();
        }
    }

    fn can_handle_more_data(&self) -> bool {
        match (self.exporter.as_ref(), self.session.as_ref()) {
            (Some(exporter), Some(session)) => {
                exporter.pending_count() <= session.output.max_queued_images / 2
            }
            _ => true,
        }
    }

    fn is_handling_data(&self) -> bool {
        self.exporter.as_ref().is_some_and(ImageExporter::is_exporting)
    }

    fn handle_pixel_data(&mut self, pixels: PixelBuffer, frame: &CapturedFrameInfo) {
        let (Some(session), Some(exporter)) = (self.session.as_ref(), self.exporter.as_ref()) else {
            warn!("Image for frame {} arrived outside a session", frame.frame_index);
            return;
        };

        let path = session
            .directory
            .join(frame.file_name(session.output.image_format.extension()));
        // Rejections are counted by the exporter.
        exporter.enqueue(pixels, path);
    }

    fn handle_annotation_data(&mut self, annotation: &FrameAnnotation, frame: &CapturedFrameInfo) {
        let Some(session) = self.session.as_ref() else {
            warn!("Annotation for frame {} arrived outside a session", frame.frame_index);
            return;
        };

        let path = session.directory.join(frame.file_name(ANNOTATION_EXTENSION));
        match write_json(&path, annotation) {
            Ok(()) => self.annotations_written += 1,
            Err(e) => {
                self.write_failures += 1;
                error!("{}", e);
            }
        }
    }

    fn failure_count(&self) -> u32 {
        self.write_failures
            + self.exporter.as_ref().map_or(0, ImageExporter::failure_count)
    }
}
