// Standard library and external crates
use std::path::PathBuf;

use bevy::prelude::Entity;
use thiserror::Error;

// Crate modules
use crate::engine::pixel::PixelFormat;

/// Errors raised by the capture pipeline.
///
/// Almost every variant is absorbed and logged where it happens; the only
/// failure visible outside a capturer is the `success` flag of
/// [`CapturerCompleted`](crate::engine::capture::CapturerCompleted).
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("pixel format {0:?} has no export mapping")]
    UnsupportedPixelFormat(PixelFormat),

    #[error("capturer `{0}` has no data handler")]
    MissingDataHandler(String),

    #[error("scene is not ready for capture")]
    SceneNotReady,

    #[error("failed to write {path}: {source}")]
    DiskWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("render target {0} does not exist")]
    MissingRenderTarget(u64),

    #[error("scene manager {existing:?} is already active, {rejected:?} deactivated")]
    ManagerAlreadyRegistered { existing: Entity, rejected: Entity },

    #[error("settings error: {0}")]
    Settings(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
