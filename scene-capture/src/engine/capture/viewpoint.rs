// Standard library and external crates
use std::sync::Arc;

use bevy::math::{EulerRot, Quat, Vec3};
use bevy::prelude::Transform;
use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};

// Crate modules
use super::annotation::{CameraDescription, FrameAnnotation};
use super::extractor::{
    CaptureFeature, ExtractorCategory, FeatureExtractor, FeatureExtractorSettings, FeatureOutput,
    FeatureRequest,
};
use crate::engine::camera::{CameraSettings, ViewInfo};
use crate::engine::render::{ReadbackResult, ReadbackTicket, RenderQueue};
use crate::engine::scene::{RenderScene, SceneSnapshot};
use crate::engine::segmentation::SceneSegmentation;

/// Camera offset from the capturer, rotation as yaw/pitch/roll in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseSettings {
    pub translation: [f32; 3],
    pub rotation_degrees: [f32; 3],
}

impl PoseSettings {
    pub fn to_transform(&self) -> Transform {
        let [yaw, pitch, roll] = self.rotation_degrees.map(f32::to_radians);
        Transform::from_translation(Vec3::from_array(self.translation))
            .with_rotation(Quat::from_euler(EulerRot::YXZ, yaw, pitch, roll))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewpointSettings {
    pub enabled: bool,
    pub display_name: String,
    pub file_name_postfix: String,
    pub pose: PoseSettings,
    pub camera_override: Option<CameraSettings>,
    pub feature_extractors_override: Option<Vec<FeatureExtractorSettings>>,
}

impl Default for ViewpointSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            display_name: "viewpoint".to_string(),
            file_name_postfix: String::new(),
            pose: PoseSettings::default(),
            camera_override: None,
            feature_extractors_override: None,
        }
    }
}

/// Per-viewpoint slice of a frame request, built by the capturer.
pub struct ViewpointRequest<'a> {
    pub frame_index: u64,
    pub viewpoint_index: usize,
    pub capturer_transform: &'a Transform,
    pub camera_randomized: bool,
    pub request: FeatureRequestParts<'a>,
}

/// Frame data shared by every viewpoint.
pub struct FeatureRequestParts<'a> {
    pub scene: &'a SceneSnapshot,
    pub render_scene: &'a Arc<RenderScene>,
    pub segmentation: &'a SceneSegmentation,
    pub queue: &'a RenderQueue,
    pub reply: &'a Sender<ReadbackResult>,
}

/// A camera pose relative to its capturer plus the extractors that capture from it.
#[derive(Debug)]
pub struct ViewpointCaptureUnit {
    settings: ViewpointSettings,
    base_camera: CameraSettings,
    camera: CameraSettings,
    extractor_settings: Vec<FeatureExtractorSettings>,
    extractors: Vec<FeatureExtractor>,
    capturing: bool,
}

impl ViewpointCaptureUnit {
    /// Resolve the viewpoint's camera and extractor list against the capturer defaults.
    pub fn new(
        settings: ViewpointSettings,
        default_camera: &CameraSettings,
        default_extractors: &[FeatureExtractorSettings],
    ) -> Self {
        let base_camera = settings.camera_override.unwrap_or(*default_camera);
        let extractor_settings = settings
            .feature_extractors_override
            .clone()
            .unwrap_or_else(|| default_extractors.to_vec());

        Self {
            settings,
            base_camera,
            camera: base_camera,
            extractor_settings,
            extractors: Vec::new(),
            capturing: false,
        }
    }

    pub fn settings(&self) -> &ViewpointSettings {
        &self.settings
    }

    pub fn name(&self) -> &str {
        &self.settings.display_name
    }

    pub fn postfix(&self) -> &str {
        &self.settings.file_name_postfix
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn base_camera(&self) -> &CameraSettings {
        &self.base_camera
    }

    pub fn camera(&self) -> &CameraSettings {
        &self.camera
    }

    pub fn extractors(&self) -> &[FeatureExtractor] {
        &self.extractors
    }

    pub fn extractor(&self, index: usize) -> Option<&FeatureExtractor> {
        self.extractors.get(index)
    }

    /// Instantiate one extractor per configured entry, releasing any previous set.
    pub fn setup_feature_extractors(&mut self, queue: &RenderQueue) {
        self.release(queue);
        self.extractors = self
            .extractor_settings
            .iter()
            .cloned()
            .map(FeatureExtractor::new)
            .collect();
        for extractor in &mut self.extractors {
            extractor.update_settings(&self.camera, queue);
            if self.capturing {
                extractor.start_capturing();
            }
        }
    }

    /// Switch camera parameters, recreating render targets when needed.
    pub fn set_camera_settings(&mut self, camera: CameraSettings, queue: &RenderQueue) {
        self.camera = camera;
        for extractor in &mut self.extractors {
            extractor.update_settings(&self.camera, queue);
        }
    }

    pub fn reset_camera(&mut self, queue: &RenderQueue) {
        self.set_camera_settings(self.base_camera, queue);
    }

    pub fn world_transform(&self, capturer: &Transform) -> Transform {
        capturer.mul_transform(self.settings.pose.to_transform())
    }

    pub fn view_info(&self, capturer: &Transform) -> ViewInfo {
        ViewInfo::new(self.world_transform(capturer), &self.camera)
    }

    pub fn description(&self) -> CameraDescription {
        CameraDescription::new(self.name(), &self.base_camera)
    }

    /// Queue render and readback work for every pixel extractor.
    /// Returns true if at least one readback was issued.
    pub fn capture_scene_to_pixels_data(
        &mut self,
        request: &ViewpointRequest<'_>,
        mut on_issued: impl FnMut(ReadbackTicket),
    ) -> bool {
        let mut issued = false;
        self.for_each_extractor(request, ExtractorCategory::PixelData, |_, output| {
            if let FeatureOutput::ReadbackIssued(ticket) = output {
                on_issued(ticket);
                issued = true;
            }
        });
        issued
    }

    /// Build annotations synchronously, as (extractor index, annotation) pairs.
    pub fn capture_scene_annotation_data(
        &mut self,
        request: &ViewpointRequest<'_>,
    ) -> Vec<(usize, FrameAnnotation)> {
        let mut annotations = Vec::new();
        self.for_each_extractor(request, ExtractorCategory::AnnotationData, |index, output| {
            if let FeatureOutput::Annotation(annotation) = output {
                annotations.push((index, annotation));
            }
        });
        annotations
    }

    fn for_each_extractor(
        &mut self,
        request: &ViewpointRequest<'_>,
        category: ExtractorCategory,
        mut on_output: impl FnMut(usize, FeatureOutput),
    ) {
        if !self.capturing || !self.settings.enabled {
            return;
        }

        let view = self.view_info(request.capturer_transform);
        let intrinsics = request.camera_randomized.then(|| self.camera.intrinsics());
        let parts = &request.request;

        for (index, extractor) in self.extractors.iter_mut().enumerate() {
            if extractor.category() != category {
                continue;
            }
            let feature_request = FeatureRequest {
                ticket: ReadbackTicket {
                    frame_index: request.frame_index,
                    viewpoint_index: request.viewpoint_index,
                    extractor_index: index,
                },
                view: &view,
                camera: &self.camera,
                intrinsics,
                scene: parts.scene,
                render_scene: parts.render_scene,
                segmentation: parts.segmentation,
                queue: parts.queue,
                reply: parts.reply,
            };
            on_output(index, extractor.capture(&feature_request));
        }
    }

    pub fn start_capturing(&mut self) {
        self.capturing = true;
        for extractor in &mut self.extractors {
            extractor.start_capturing();
        }
    }

    pub fn stop_capturing(&mut self) {
        self.capturing = false;
        for extractor in &mut self.extractors {
            extractor.stop_capturing();
        }
    }

    pub fn release(&mut self, queue: &RenderQueue) {
        for extractor in &mut self.extractors {
            extractor.release(queue);
        }
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel;

    use super::*;
    use crate::engine::capture::extractor::ExtractorKind;
    use crate::engine::render::{RenderThread, SoftwareRasterizer};

    #[test]
    fn pose_offsets_capturer_transform() {
        let settings = ViewpointSettings {
            pose: PoseSettings {
                translation: [1.0, 0.0, 0.0],
                rotation_degrees: [90.0, 0.0, 0.0],
            },
            ..Default::default()
        };
        let viewpoint = ViewpointCaptureUnit::new(settings, &CameraSettings::default(), &[]);
        let world = viewpoint.world_transform(&Transform::from_xyz(0.0, 2.0, 0.0));

        assert!(world.translation.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
        assert!((world.forward().x + 1.0).abs() < 1e-5);
    }

    #[test]
    fn capture_reports_issued_readbacks() {
        let thread = RenderThread::inline(Box::new(SoftwareRasterizer::default()));
        let camera = CameraSettings {
            width: 16,
            height: 16,
            ..Default::default()
        };
        let extractors = [
            FeatureExtractorSettings::new(ExtractorKind::Rgb),
            FeatureExtractorSettings::new(ExtractorKind::Depth { quantized: true }),
            FeatureExtractorSettings::new(ExtractorKind::ObjectAnnotations),
        ];
        let mut viewpoint =
            ViewpointCaptureUnit::new(ViewpointSettings::default(), &camera, &extractors);
        viewpoint.setup_feature_extractors(thread.queue());

        let (reply, receiver) = channel::unbounded();
        let scene = SceneSnapshot::default();
        let render_scene = Arc::new(RenderScene::default());
        let segmentation = SceneSegmentation::default();
        let request = ViewpointRequest {
            frame_index: 3,
            viewpoint_index: 0,
            capturer_transform: &Transform::IDENTITY,
            camera_randomized: false,
            request: FeatureRequestParts {
                scene: &scene,
                render_scene: &render_scene,
                segmentation: &segmentation,
                queue: thread.queue(),
                reply: &reply,
            },
        };

        let mut tickets = Vec::new();
        assert!(!viewpoint.capture_scene_to_pixels_data(&request, |t| tickets.push(t)));

        viewpoint.start_capturing();
        assert!(viewpoint.capture_scene_to_pixels_data(&request, |t| tickets.push(t)));
        assert_eq!(tickets.len(), 2);
        assert_eq!(receiver.len(), 2);

        let annotations = viewpoint.capture_scene_annotation_data(&request);
        assert_eq!(annotations.len(), 1);
        assert_eq!(annotations[0].0, 2);
    }
}
