use std::io;
use std::path::{Path, PathBuf};

use scene_capture::engine::pixel::PixelFormat;
use scene_capture::error::CaptureError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("pixel format {0:?} cannot be encoded")]
    UnsupportedPixelFormat(PixelFormat),

    #[error("{width}x{height} pixel buffer does not match its byte length")]
    BufferSize { width: u32, height: u32 },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("export worker is not running")]
    WorkerStopped,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ExportError {
    /// Map into the capture pipeline's taxonomy at the data handler boundary.
    pub fn into_capture_error(self, path: &Path) -> CaptureError {
        match self {
            Self::UnsupportedPixelFormat(format) => CaptureError::UnsupportedPixelFormat(format),
            Self::Write { path, source } => CaptureError::DiskWriteFailure { path, source },
            Self::Io(source) => CaptureError::DiskWriteFailure {
                path: path.to_path_buf(),
                source,
            },
            other => CaptureError::DiskWriteFailure {
                path: path.to_path_buf(),
                source: io::Error::other(other.to_string()),
            },
        }
    }
}
