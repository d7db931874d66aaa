//! Scene capture and annotation for synthetic dataset generation.
//!
//! Capturers attached to entities render the scene from one or more
//! viewpoints, read the pixels back from a render worker and hand images
//! and per-frame annotations to a [`DataHandler`](engine::capture::DataHandler).
//! A [`SceneManager`](engine::manager::SceneManager) optionally walks the
//! capturers through a list of scene markers.

pub mod config;
pub mod engine;
pub mod error;

/// Types most applications need to set up a capture.
pub mod prelude {
    pub use crate::config::{
        CapturerSettings, CommandLineOverrides, DirectoryConflictPolicy, ImageFormat,
        OutputSettings,
    };
    pub use crate::engine::camera::{CameraRandomization, CameraSettings};
    pub use crate::engine::capture::{
        CaptureObserver, CaptureSession, CapturedFrameInfo, CapturerCompleted, CapturerState,
        DataHandler, ExtractorKind, FeatureExtractorSettings, FrameAnnotation, PoseSettings,
        SceneCapturer, ViewpointSettings,
    };
    pub use crate::engine::core::plugin::{SceneCapturePlugin, SceneCaptureSet};
    pub use crate::engine::cuboid::{CuboidData, CuboidStrategy};
    pub use crate::engine::manager::{
        SceneCaptured, SceneManager, SceneManagerSettings, SceneManagerState,
    };
    pub use crate::engine::pixel::{PixelBuffer, PixelFormat};
    pub use crate::engine::scene::{CaptureObject, MeshData, SceneMarker};
    pub use crate::engine::segmentation::SegmentationSettings;
    pub use crate::error::CaptureError;
}
