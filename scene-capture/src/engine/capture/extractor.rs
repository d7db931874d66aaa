// Standard library and external crates
use std::sync::Arc;

use bevy::log::{error, warn};
use capture_constants::output::{
    BOUNDING_BOX_POSTFIX, CLASS_SEGMENTATION_POSTFIX, DEPTH_POSTFIX,
    INSTANCE_SEGMENTATION_POSTFIX, OBJECT_ANNOTATION_POSTFIX, QUANTIZED_DEPTH_POSTFIX,
    RGB_POSTFIX,
};
use crossbeam::channel::Sender;
use serde::{Deserialize, Serialize};

// Crate modules
use super::annotation::FrameAnnotation;
use crate::engine::camera::{CameraIntrinsics, CameraSettings, ViewInfo};
use crate::engine::pixel::{PixelFormat, TextureReader};
use crate::engine::render::{
    ReadbackResult, ReadbackTicket, RenderCommand, RenderPass, RenderQueue, RenderTargetId,
};
use crate::engine::scene::{RenderScene, SceneSnapshot};
use crate::engine::segmentation::SceneSegmentation;

/// The closed set of feature extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorKind {
    Rgb,
    Depth { quantized: bool },
    StencilMask,
    VertexColorMask,
    ObjectAnnotations,
    BoundingBoxes,
}

/// Pixel extractors read render targets back; annotation extractors build JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractorCategory {
    PixelData,
    AnnotationData,
}

impl ExtractorKind {
    pub fn category(self) -> ExtractorCategory {
        match self {
            Self::ObjectAnnotations | Self::BoundingBoxes => ExtractorCategory::AnnotationData,
            _ => ExtractorCategory::PixelData,
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Depth { quantized: false } => "depth",
            Self::Depth { quantized: true } => "depth_16",
            Self::StencilMask => "class_segmentation",
            Self::VertexColorMask => "instance_segmentation",
            Self::ObjectAnnotations => "object_annotations",
            Self::BoundingBoxes => "bounding_boxes",
        }
    }

    pub fn default_postfix(self) -> &'static str {
        match self {
            Self::Rgb => RGB_POSTFIX,
            Self::Depth { quantized: false } => DEPTH_POSTFIX,
            Self::Depth { quantized: true } => QUANTIZED_DEPTH_POSTFIX,
            Self::StencilMask => CLASS_SEGMENTATION_POSTFIX,
            Self::VertexColorMask => INSTANCE_SEGMENTATION_POSTFIX,
            Self::ObjectAnnotations => OBJECT_ANNOTATION_POSTFIX,
            Self::BoundingBoxes => BOUNDING_BOX_POSTFIX,
        }
    }

    pub fn render_pass(self) -> Option<RenderPass> {
        match self {
            Self::Rgb => Some(RenderPass::Color),
            Self::Depth { .. } => Some(RenderPass::Depth),
            Self::StencilMask => Some(RenderPass::ClassMask),
            Self::VertexColorMask => Some(RenderPass::InstanceMask),
            Self::ObjectAnnotations | Self::BoundingBoxes => None,
        }
    }

    /// Render target format used when the settings do not override it.
    pub fn surface_format(self, camera: &CameraSettings) -> Option<PixelFormat> {
        match self {
            Self::Rgb if camera.hdr => Some(PixelFormat::Rgba16Float),
            Self::Rgb => Some(PixelFormat::Bgra8),
            Self::Depth { .. } => Some(PixelFormat::R32Float),
            Self::StencilMask => Some(PixelFormat::R8),
            Self::VertexColorMask => Some(PixelFormat::Rgba8),
            Self::ObjectAnnotations | Self::BoundingBoxes => None,
        }
    }

    /// Readback format; `None` keeps the surface's export mapping.
    pub fn readback_format(self) -> Option<PixelFormat> {
        match self {
            Self::Depth { quantized: true } => Some(PixelFormat::R16),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureExtractorSettings {
    pub kind: ExtractorKind,
    pub enabled: bool,
    pub display_name: Option<String>,
    pub file_name_postfix: Option<String>,
    /// Render target format override for pixel extractors.
    pub pixel_format: Option<PixelFormat>,
}

impl Default for FeatureExtractorSettings {
    fn default() -> Self {
        Self::new(ExtractorKind::Rgb)
    }
}

impl FeatureExtractorSettings {
    pub fn new(kind: ExtractorKind) -> Self {
        Self {
            kind,
            enabled: true,
            display_name: None,
            file_name_postfix: None,
            pixel_format: None,
        }
    }

    pub fn name(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.kind.default_name())
    }

    pub fn postfix(&self) -> &str {
        self.file_name_postfix
            .as_deref()
            .unwrap_or_else(|| self.kind.default_postfix())
    }
}

/// Inputs shared by every extractor of one viewpoint for one frame.
pub struct FeatureRequest<'a> {
    pub ticket: ReadbackTicket,
    pub view: &'a ViewInfo,
    pub camera: &'a CameraSettings,
    /// Set when the camera was randomised for this frame.
    pub intrinsics: Option<CameraIntrinsics>,
    pub scene: &'a SceneSnapshot,
    pub render_scene: &'a Arc<RenderScene>,
    pub segmentation: &'a SceneSegmentation,
    pub queue: &'a RenderQueue,
    pub reply: &'a Sender<ReadbackResult>,
}

#[derive(Debug)]
pub enum FeatureOutput {
    /// A readback was queued; the result arrives on the reply channel.
    ReadbackIssued(ReadbackTicket),
    Annotation(FrameAnnotation),
    Skipped,
}

/// What every extractor variant can do.
pub trait CaptureFeature {
    fn capture(&mut self, request: &FeatureRequest<'_>) -> FeatureOutput;

    /// React to a camera change, e.g. a new randomised resolution.
    fn update_settings(&mut self, camera: &CameraSettings, queue: &RenderQueue);

    /// Free render resources.
    fn release(&mut self, _queue: &RenderQueue) {}
}

/// Renders one pass into its own target and reads it back.
#[derive(Debug)]
pub struct PixelDataExtractor {
    kind: ExtractorKind,
    pass: RenderPass,
    format_override: Option<PixelFormat>,
    surface_format: Option<PixelFormat>,
    reader: TextureReader,
    target: Option<RenderTargetId>,
    camera: Option<CameraSettings>,
}

impl PixelDataExtractor {
    fn new(kind: ExtractorKind, pass: RenderPass, format_override: Option<PixelFormat>) -> Self {
        Self {
            kind,
            pass,
            format_override,
            surface_format: None,
            reader: TextureReader::default(),
            target: None,
            camera: None,
        }
    }

    /// Resolve the surface format, rejecting formats readback cannot convert.
    fn resolve_format(&self, camera: &CameraSettings) -> Option<PixelFormat> {
        let format = self
            .format_override
            .or_else(|| self.kind.surface_format(camera))?;
        let readback = match self.kind.readback_format() {
            Some(target) => Some(target),
            None => format.export_format().ok(),
        };
        match readback {
            Some(target) if format.converts_to(target) => Some(format),
            _ => {
                error!(
                    "{} extractor cannot export {:?} surfaces, capture skipped",
                    self.kind.default_name(),
                    format
                );
                None
            }
        }
    }

    /// Create the render target on first use and after camera changes.
    fn ensure_target(&mut self, camera: &CameraSettings, queue: &RenderQueue) -> Option<RenderTargetId> {
        if self.camera.as_ref() == Some(camera) {
            return self.target;
        }

        self.release(queue);
        self.camera = Some(*camera);
        self.surface_format = self.resolve_format(camera);

        let format = self.surface_format?;
        let target = queue.create_target(camera.resolution(), format)?;
        self.reader
            .set_source(target, None, self.kind.readback_format(), None);
        self.target = Some(target);
        self.target
    }

    pub fn target(&self) -> Option<RenderTargetId> {
        self.target
    }

    pub fn reader(&self) -> &TextureReader {
        &self.reader
    }
}

impl CaptureFeature for PixelDataExtractor {
    fn capture(&mut self, request: &FeatureRequest<'_>) -> FeatureOutput {
        let Some(target) = self.ensure_target(request.camera, request.queue) else {
            return FeatureOutput::Skipped;
        };

        let rendered = request.queue.submit(RenderCommand::RenderScene {
            target,
            pass: self.pass,
            scene: Arc::clone(request.render_scene),
            view: *request.view,
        });
        if !rendered {
            warn!("Render worker unavailable, frame {} dropped", request.ticket.frame_index);
            return FeatureOutput::Skipped;
        }

        if self
            .reader
            .read_async(request.queue, request.ticket, request.reply)
        {
            FeatureOutput::ReadbackIssued(request.ticket)
        } else {
            FeatureOutput::Skipped
        }
    }

    fn update_settings(&mut self, camera: &CameraSettings, queue: &RenderQueue) {
        self.ensure_target(camera, queue);
    }

    fn release(&mut self, queue: &RenderQueue) {
        if let Some(target) = self.target.take() {
            queue.release_target(target);
        }
        self.reader.clear_source();
        self.camera = None;
    }
}

/// Builds per-frame JSON annotations synchronously on the capturing thread.
#[derive(Debug, Clone, Copy)]
pub struct AnnotationDataExtractor {
    with_pose: bool,
}

impl CaptureFeature for AnnotationDataExtractor {
    fn capture(&mut self, request: &FeatureRequest<'_>) -> FeatureOutput {
        FeatureOutput::Annotation(FrameAnnotation::capture(
            request.scene,
            request.segmentation,
            request.view,
            request.intrinsics,
            self.with_pose,
        ))
    }

    fn update_settings(&mut self, _camera: &CameraSettings, _queue: &RenderQueue) {}
}

#[derive(Debug)]
pub enum ExtractorVariant {
    PixelData(PixelDataExtractor),
    AnnotationData(AnnotationDataExtractor),
}

/// One configured extractor of a viewpoint.
#[derive(Debug)]
pub struct FeatureExtractor {
    settings: FeatureExtractorSettings,
    capturing: bool,
    variant: ExtractorVariant,
}

impl FeatureExtractor {
    pub fn new(settings: FeatureExtractorSettings) -> Self {
        let kind = settings.kind;
        let variant = match kind.render_pass() {
            Some(pass) => {
                ExtractorVariant::PixelData(PixelDataExtractor::new(kind, pass, settings.pixel_format))
            }
            None => ExtractorVariant::AnnotationData(AnnotationDataExtractor {
                with_pose: kind == ExtractorKind::ObjectAnnotations,
            }),
        };

        Self {
            settings,
            capturing: false,
            variant,
        }
    }

    pub fn settings(&self) -> &FeatureExtractorSettings {
        &self.settings
    }

    pub fn kind(&self) -> ExtractorKind {
        self.settings.kind
    }

    pub fn category(&self) -> ExtractorCategory {
        self.settings.kind.category()
    }

    pub fn name(&self) -> &str {
        self.settings.name()
    }

    pub fn postfix(&self) -> &str {
        self.settings.postfix()
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    pub fn variant(&self) -> &ExtractorVariant {
        &self.variant
    }

    pub fn start_capturing(&mut self) {
        self.capturing = self.settings.enabled;
    }

    pub fn stop_capturing(&mut self) {
        self.capturing = false;
    }

    fn feature(&mut self) -> &mut dyn CaptureFeature {
        match &mut self.variant {
            ExtractorVariant::PixelData(extractor) => extractor,
            ExtractorVariant::AnnotationData(extractor) => extractor,
        }
    }
}

impl CaptureFeature for FeatureExtractor {
    /// Extractors that are not capturing skip silently.
    fn capture(&mut self, request: &FeatureRequest<'_>) -> FeatureOutput {
        if !self.capturing {
            return FeatureOutput::Skipped;
        }
        self.feature().capture(request)
    }

    fn update_settings(&mut self, camera: &CameraSettings, queue: &RenderQueue) {
        if self.settings.enabled {
            self.feature().update_settings(camera, queue);
        }
    }

    fn release(&mut self, queue: &RenderQueue) {
        self.feature().release(queue);
    }
}

#[cfg(test)]
mod tests {
    use crossbeam::channel;

    use super::*;
    use crate::engine::render::{RenderThread, SoftwareRasterizer};

    #[test]
    fn settings_parse_from_snake_case() {
        let settings: FeatureExtractorSettings =
            serde_json::from_str(r#"{ "kind": { "depth": { "quantized": true } } }"#).unwrap();
        assert_eq!(settings.kind, ExtractorKind::Depth { quantized: true });
        assert_eq!(settings.postfix(), "depth.16");
        assert_eq!(settings.name(), "depth_16");
    }

    #[test]
    fn idle_extractor_skips_capture() {
        let thread = RenderThread::inline(Box::new(SoftwareRasterizer::default()));
        let (reply, receiver) = channel::unbounded();
        let camera = CameraSettings {
            width: 8,
            height: 8,
            ..Default::default()
        };
        let view = ViewInfo::new(Default::default(), &camera);
        let scene = SceneSnapshot::default();
        let render_scene = Arc::new(RenderScene::default());
        let segmentation = SceneSegmentation::default();
        let request = FeatureRequest {
            ticket: ReadbackTicket::default(),
            view: &view,
            camera: &camera,
            intrinsics: None,
            scene: &scene,
            render_scene: &render_scene,
            segmentation: &segmentation,
            queue: thread.queue(),
            reply: &reply,
        };

        let mut extractor = FeatureExtractor::new(FeatureExtractorSettings::new(ExtractorKind::Rgb));
        assert!(matches!(extractor.capture(&request), FeatureOutput::Skipped));

        extractor.start_capturing();
        assert!(matches!(
            extractor.capture(&request),
            FeatureOutput::ReadbackIssued(_)
        ));
        let pixels = receiver.try_recv().unwrap().pixels.unwrap();
        assert_eq!(pixels.format(), PixelFormat::Bgra8);
    }

    #[test]
    fn unexportable_override_is_skipped() {
        let thread = RenderThread::inline(Box::new(SoftwareRasterizer::default()));
        let mut settings = FeatureExtractorSettings::new(ExtractorKind::Depth { quantized: false });
        settings.pixel_format = Some(PixelFormat::Rg32Float);

        let mut extractor = FeatureExtractor::new(settings);
        extractor.update_settings(&CameraSettings::default(), thread.queue());
        match extractor.variant() {
            ExtractorVariant::PixelData(pixel) => assert!(pixel.target().is_none()),
            ExtractorVariant::AnnotationData(_) => panic!("depth is a pixel extractor"),
        }
    }
}
