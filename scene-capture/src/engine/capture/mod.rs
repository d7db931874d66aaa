mod annotation;
mod capturer;
mod data_handler;
mod extractor;
mod frame_counter;
mod viewpoint;

pub use annotation::{
    BoundingBox2d, CameraData, CameraDescription, ExportedObject, FrameAnnotation,
    ObjectAnnotation, ObjectPose,
};
pub use capturer::{CaptureTickContext, CapturerState, SceneCapturer, TickOutcome};
pub use data_handler::{
    CameraSettingsFile, CaptureObserver, CaptureSession, CapturedFrameInfo, DataHandler,
    ObjectSettingsFile,
};
pub use extractor::{
    AnnotationDataExtractor, CaptureFeature, ExtractorCategory, ExtractorKind, ExtractorVariant,
    FeatureExtractor, FeatureExtractorSettings, FeatureOutput, FeatureRequest, PixelDataExtractor,
};
pub use frame_counter::FrameCounter;
pub use viewpoint::{
    FeatureRequestParts, PoseSettings, ViewpointCaptureUnit, ViewpointRequest, ViewpointSettings,
};

use bevy::prelude::{Entity, Event};

/// Sent once per capture session when a capturer reaches `Completed`, or
/// with `success: false` when its session could not start.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapturerCompleted {
    pub capturer: Entity,
    /// False when readbacks or disk writes failed during the session.
    pub success: bool,
}
