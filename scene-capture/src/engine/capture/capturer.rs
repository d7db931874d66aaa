// Standard library and external crates
use std::sync::Arc;

use bevy::prelude::*;
use capture_constants::capture::{START_RETRY_DELAY_SECS, START_WARNING_TIMEOUT_SECS};
use crossbeam::channel::{self, Receiver, Sender};
use rand::rngs::SmallRng;
use rand::SeedableRng;

// Crate modules
use super::annotation::ExportedObject;
use super::data_handler::{
    CaptureObserver, CaptureSession, CapturedFrameInfo, DataHandler,
};
use super::extractor::ExtractorKind;
use super::frame_counter::FrameCounter;
use super::viewpoint::{FeatureRequestParts, ViewpointCaptureUnit, ViewpointRequest};
use crate::config::{CapturerSettings, CommandLineOverrides};
use crate::engine::render::{ReadbackResult, ReadbackTicket, RenderQueue};
use crate::engine::scene::{RenderScene, SceneSnapshot};
use crate::engine::segmentation::SceneSegmentation;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CapturerState {
    /// Not initialised, or disabled by settings.
    #[default]
    NotActive,
    /// Initialised and waiting for a start.
    Active,
    Running,
    Paused,
    /// Reached its frame limit and flushed all data.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopPhase {
    AwaitingReadbacks,
    Draining,
}

#[derive(Debug, Clone, Copy, Default)]
struct PendingStart {
    waited_secs: f32,
    retry_in_secs: f32,
    warned: bool,
}

/// What the capturer needs from the world for one tick.
pub struct CaptureTickContext<'a> {
    pub scene: &'a SceneSnapshot,
    /// False while the scene manager is still moving capturers around.
    pub scene_ready: bool,
    /// Simulation time since the last tick. Zero while simulation is paused.
    pub delta_secs: f32,
    pub real_delta_secs: f32,
    pub transform: &'a Transform,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// The data handler is saturated; simulation time should stop.
    pub throttle: bool,
    /// Set on the tick the capturer completes, with its success flag.
    pub completed: Option<bool>,
}

/// Drives capture of one or more viewpoints into a data handler.
///
/// ```text
/// NotActive -> Active -> Running <-> Paused
///                 ^         |
///                 |         v (frame limit, data flushed)
///                 +---- Completed
/// ```
#[derive(Component)]
pub struct SceneCapturer {
    name: String,
    settings: CapturerSettings,
    state: CapturerState,
    viewpoints: Vec<ViewpointCaptureUnit>,
    data_handler: Option<Box<dyn DataHandler>>,
    observer: Option<Box<dyn CaptureObserver>>,
    render_queue: Option<RenderQueue>,
    readback_sender: Sender<ReadbackResult>,
    readback_receiver: Receiver<ReadbackResult>,
    outstanding_readbacks: usize,
    readback_failures: u32,
    segmentation: SceneSegmentation,
    frame_counter: FrameCounter,
    pending_start: Option<PendingStart>,
    stop_phase: Option<StopPhase>,
    since_last_capture: f32,
    real_since_last_capture: f32,
    marker_name: Option<String>,
    local_offset: Transform,
    rng: SmallRng,
}

impl SceneCapturer {
    pub fn new(name: impl Into<String>, settings: CapturerSettings) -> Result<Self, CaptureError> {
        settings.validate()?;
        let (readback_sender, readback_receiver) = channel::unbounded();
        let rng = match settings
            .camera_randomization
            .as_ref()
            .and_then(|randomization| randomization.seed)
        {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };

        Ok(Self {
            name: name.into(),
            segmentation: SceneSegmentation::new(&settings.segmentation),
            settings,
            state: CapturerState::NotActive,
            viewpoints: Vec::new(),
            data_handler: None,
            observer: None,
            render_queue: None,
            readback_sender,
            readback_receiver,
            outstanding_readbacks: 0,
            readback_failures: 0,
            frame_counter: FrameCounter::default(),
            pending_start: None,
            stop_phase: None,
            since_last_capture: 0.0,
            real_since_last_capture: 0.0,
            marker_name: None,
            local_offset: Transform::IDENTITY,
            rng,
        })
    }

    pub fn with_data_handler(mut self, handler: impl DataHandler + 'static) -> Self {
        self.data_handler = Some(Box::new(handler));
        self
    }

    pub fn with_observer(mut self, observer: impl CaptureObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn set_data_handler(&mut self, handler: Box<dyn DataHandler>) {
        self.data_handler = Some(handler);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &CapturerSettings {
        &self.settings
    }

    pub fn state(&self) -> CapturerState {
        self.state
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, CapturerState::Running | CapturerState::Paused)
    }

    pub fn frame_counter(&self) -> &FrameCounter {
        &self.frame_counter
    }

    pub fn viewpoints(&self) -> &[ViewpointCaptureUnit] {
        &self.viewpoints
    }

    pub fn segmentation(&self) -> &SceneSegmentation {
        &self.segmentation
    }

    pub fn has_pending_start(&self) -> bool {
        self.pending_start.is_some()
    }

    /// Transform relative to the marker the capturer is attached to.
    pub fn local_offset(&self) -> Transform {
        self.local_offset
    }

    pub fn set_local_offset(&mut self, offset: Transform) {
        self.local_offset = offset;
    }

    /// Marker name appended to the session directory.
    pub fn set_marker_name(&mut self, marker: Option<String>) {
        self.marker_name = marker;
    }

    /// Replace settings from launch arguments. Only before initialisation.
    pub fn apply_overrides(&mut self, overrides: &CommandLineOverrides) -> Result<(), CaptureError> {
        if self.state != CapturerState::NotActive {
            return Err(CaptureError::InvalidState(format!(
                "capturer `{}` is already initialised",
                self.name
            )));
        }
        self.settings = overrides.apply(&self.name, &self.settings)?;
        self.segmentation = SceneSegmentation::new(&self.settings.segmentation);
        Ok(())
    }

    /// Build viewpoints and extractors. NotActive -> Active unless disabled.
    pub fn initialize(&mut self, queue: RenderQueue) -> bool {
        if self.state != CapturerState::NotActive {
            return false;
        }
        if !self.settings.active {
            info!("Capturer `{}` disabled by settings", self.name);
            return false;
        }

        self.viewpoints = self
            .settings
            .viewpoints
            .iter()
            .filter(|viewpoint| viewpoint.enabled)
            .cloned()
            .map(|viewpoint| {
                ViewpointCaptureUnit::new(
                    viewpoint,
                    &self.settings.camera,
                    &self.settings.feature_extractors,
                )
            })
            .collect();
        for viewpoint in &mut self.viewpoints {
            viewpoint.setup_feature_extractors(&queue);
        }
        self.render_queue = Some(queue);
        self.state = CapturerState::Active;
        info!(
            "Capturer `{}` initialised with {} viewpoint(s)",
            self.name,
            self.viewpoints.len()
        );
        true
    }

    /// Request a start. The start happens on a later tick, once the scene is ready.
    pub fn start_capturing(&mut self) -> bool {
        if self.state != CapturerState::Active {
            debug!(
                "Capturer `{}` ignores start while {:?}",
                self.name, self.state
            );
            return false;
        }
        if self.pending_start.is_none() {
            self.pending_start = Some(PendingStart::default());
        }
        true
    }

    /// Stop after the data already captured is flushed. Only valid while capturing.
    pub fn stop_capturing(&mut self) -> bool {
        self.pending_start = None;
        debug_assert!(
            self.is_capturing(),
            "stop_capturing called while {:?}",
            self.state
        );
        if !self.is_capturing() {
            warn!(
                "Capturer `{}` cannot stop while {:?}",
                self.name, self.state
            );
            return false;
        }
        if self.stop_phase.is_some() {
            return false;
        }

        for viewpoint in &mut self.viewpoints {
            viewpoint.stop_capturing();
        }
        self.stop_phase = Some(StopPhase::AwaitingReadbacks);
        info!(
            "Capturer `{}` stopping after {} frame(s)",
            self.name,
            self.frame_counter.total_frame_count()
        );
        true
    }

    pub fn pause_capturing(&mut self) -> bool {
        if self.state != CapturerState::Running || self.stop_phase.is_some() {
            return false;
        }
        for viewpoint in &mut self.viewpoints {
            viewpoint.stop_capturing();
        }
        self.state = CapturerState::Paused;
        true
    }

    pub fn resume_capturing(&mut self) -> bool {
        if self.state != CapturerState::Paused || self.stop_phase.is_some() {
            return false;
        }
        for viewpoint in &mut self.viewpoints {
            viewpoint.start_capturing();
        }
        self.state = CapturerState::Running;
        true
    }

    /// Completed -> Active, ready for the next point of interest.
    pub fn reset_for_next_session(&mut self) -> bool {
        if self.state != CapturerState::Completed {
            return false;
        }
        self.state = CapturerState::Active;
        true
    }

    pub fn tick(&mut self, context: &CaptureTickContext<'_>) -> TickOutcome {
        let mut outcome = TickOutcome::default();
        self.poll_readbacks();

        match self.state {
            CapturerState::Active => outcome.completed = self.tick_pending_start(context),
            CapturerState::Running if self.stop_phase.is_none() => self.tick_running(context),
            _ => {}
        }

        if self.stop_phase.is_some() {
            outcome.completed = self.tick_stopping();
        } else if self.is_capturing() {
            outcome.throttle = self.readbacks_saturated()
                || self
                    .data_handler
                    .as_ref()
                    .is_some_and(|handler| !handler.can_handle_more_data());
        }
        outcome
    }

    /// The render worker owes as many readbacks as the output queue may hold.
    fn readbacks_saturated(&self) -> bool {
        self.outstanding_readbacks >= self.settings.output.max_queued_images as usize
    }

    /// Returns `Some(false)` when the session could not start. The capturer
    /// stays `Active` so a later start can succeed.
    fn tick_pending_start(&mut self, context: &CaptureTickContext<'_>) -> Option<bool> {
        let pending = self.pending_start.as_mut()?;

        pending.waited_secs += context.real_delta_secs;
        pending.retry_in_secs -= context.real_delta_secs;
        if pending.retry_in_secs > 0.0 {
            return None;
        }

        if !context.scene_ready {
            pending.retry_in_secs = START_RETRY_DELAY_SECS;
            if pending.waited_secs >= START_WARNING_TIMEOUT_SECS && !pending.warned {
                pending.warned = true;
                warn!(
                    "Capturer `{}` has waited {:.1}s for the scene to become ready",
                    self.name, pending.waited_secs
                );
            }
            return None;
        }

        self.pending_start = None;
        match self.begin_session(context) {
            Ok(()) => None,
            Err(e) => {
                error!("Capturer `{}` could not start: {}", self.name, e);
                Some(false)
            }
        }
    }

    fn begin_session(&mut self, context: &CaptureTickContext<'_>) -> Result<(), CaptureError> {
        let Some(queue) = self.render_queue.clone() else {
            return Err(CaptureError::InvalidState("not initialised".to_string()));
        };
        if self.data_handler.is_none() {
            return Err(CaptureError::MissingDataHandler(self.name.clone()));
        }

        self.segmentation.scan(context.scene);
        for viewpoint in &mut self.viewpoints {
            viewpoint.reset_camera(&queue);
        }

        let session = CaptureSession {
            capturer_name: self.name.clone(),
            marker_name: self.marker_name.clone(),
            output: self.settings.output.clone(),
            cameras: self
                .viewpoints
                .iter()
                .map(ViewpointCaptureUnit::description)
                .collect(),
            objects: context
                .scene
                .objects
                .iter()
                .filter(|object| object.object.export_annotations)
                .filter_map(|object| ExportedObject::from_scene_object(object, &self.segmentation))
                .collect(),
        };
        if let Some(handler) = self.data_handler.as_mut() {
            handler.on_start_capturing(&session)?;
        }

        self.frame_counter.reset();
        self.readback_failures = 0;
        self.outstanding_readbacks = 0;
        // First Running tick captures immediately.
        self.since_last_capture = self.settings.capture_interval_secs;
        self.real_since_last_capture = 0.0;
        for viewpoint in &mut self.viewpoints {
            viewpoint.start_capturing();
        }
        self.state = CapturerState::Running;

        info!(
            "→ Capturer `{}` running{}",
            self.name,
            self.marker_name
                .as_ref()
                .map(|marker| format!(" at `{}`", marker))
                .unwrap_or_default()
        );
        Ok(())
    }

    fn tick_running(&mut self, context: &CaptureTickContext<'_>) {
        if self.segmentation.needs_rescan(context.scene) {
            self.segmentation.scan(context.scene);
        }

        self.real_since_last_capture += context.real_delta_secs;
        let Some(handler) = self.data_handler.as_ref() else {
            return;
        };
        if !handler.can_handle_more_data() || self.readbacks_saturated() {
            return;
        }

        self.since_last_capture += context.delta_secs;
        if self.since_last_capture + f32::EPSILON < self.settings.capture_interval_secs
            || !context.scene_ready
        {
            return;
        }

        self.capture_frame(context);
        self.since_last_capture = 0.0;

        let max_frames = self.settings.max_frames as u64;
        if max_frames > 0 && self.frame_counter.total_frame_count() >= max_frames {
            self.stop_capturing();
        }
    }

    fn capture_frame(&mut self, context: &CaptureTickContext<'_>) {
        let Some(queue) = self.render_queue.as_ref() else {
            return;
        };
        let frame_index = self.frame_counter.total_frame_count();

        let randomization = self
            .settings
            .camera_randomization
            .as_ref()
            .filter(|randomization| randomization.is_enabled());
        if let Some(randomization) = randomization {
            for viewpoint in &mut self.viewpoints {
                let camera = randomization.apply(viewpoint.base_camera(), &mut self.rng);
                viewpoint.set_camera_settings(camera, queue);
            }
        }

        let render_scene = Arc::new(RenderScene::from_snapshot(context.scene, &self.segmentation));
        let mut annotations = Vec::new();
        for (viewpoint_index, viewpoint) in self.viewpoints.iter_mut().enumerate() {
            let request = ViewpointRequest {
                frame_index,
                viewpoint_index,
                capturer_transform: context.transform,
                camera_randomized: randomization.is_some(),
                request: FeatureRequestParts {
                    scene: context.scene,
                    render_scene: &render_scene,
                    segmentation: &self.segmentation,
                    queue,
                    reply: &self.readback_sender,
                },
            };

            let outstanding = &mut self.outstanding_readbacks;
            viewpoint.capture_scene_to_pixels_data(&request, |_| *outstanding += 1);
            annotations.extend(
                viewpoint
                    .capture_scene_annotation_data(&request)
                    .into_iter()
                    .map(|(extractor_index, annotation)| {
                        let ticket = ReadbackTicket {
                            frame_index,
                            viewpoint_index,
                            extractor_index,
                        };
                        (ticket, annotation)
                    }),
            );
        }

        for (ticket, annotation) in annotations {
            let frame = self.frame_info(&ticket);
            if let Some(observer) = self.observer.as_mut() {
                observer.on_annotation_data(&annotation, &frame);
            }
            if let Some(handler) = self.data_handler.as_mut() {
                handler.handle_annotation_data(&annotation, &frame);
            }
        }

        self.frame_counter.record_frame(self.real_since_last_capture);
        self.real_since_last_capture = 0.0;
        debug!("Capturer `{}` captured frame {}", self.name, frame_index);
    }

    /// Hand finished readbacks to the data handler.
    fn poll_readbacks(&mut self) {
        while let Ok(result) = self.readback_receiver.try_recv() {
            self.outstanding_readbacks = self.outstanding_readbacks.saturating_sub(1);
            let frame = self.frame_info(&result.ticket);

            match result.pixels {
                Ok(pixels) => {
                    if let Some(observer) = self.observer.as_mut() {
                        observer.on_pixel_data(&pixels, &frame);
                    }
                    match self.data_handler.as_mut() {
                        Some(handler) => handler.handle_pixel_data(pixels, &frame),
                        None => warn!("Capturer `{}` dropped pixels, no handler", self.name),
                    }
                }
                Err(e) => {
                    self.readback_failures += 1;
                    warn!(
                        "Readback for {} failed: {}",
                        frame.file_name("*"),
                        e
                    );
                }
            }
        }
    }

    /// Advance the stop sequence. Returns the success flag once completed.
    fn tick_stopping(&mut self) -> Option<bool> {
        if self.stop_phase == Some(StopPhase::AwaitingReadbacks) {
            if self.outstanding_readbacks > 0 {
                return None;
            }
            if let Some(handler) = self.data_handler.as_mut() {
                handler.on_stop_capturing();
            }
            self.stop_phase = Some(StopPhase::Draining);
        }

        let handler_failures = match self.data_handler.as_ref() {
            Some(handler) if handler.is_handling_data() => return None,
            Some(handler) => handler.failure_count(),
            None => 0,
        };

        self.stop_phase = None;
        self.state = CapturerState::Completed;
        let success = self.readback_failures == 0 && handler_failures == 0;
        if success {
            info!(
                "✓ Capturer `{}` completed {} frame(s)",
                self.name,
                self.frame_counter.total_frame_count()
            );
        } else {
            warn!(
                "Capturer `{}` completed with {} readback and {} write failure(s)",
                self.name, self.readback_failures, handler_failures
            );
        }
        Some(success)
    }

    fn frame_info(&self, ticket: &ReadbackTicket) -> CapturedFrameInfo {
        let viewpoint = self.viewpoints.get(ticket.viewpoint_index);
        let extractor = viewpoint.and_then(|viewpoint| viewpoint.extractor(ticket.extractor_index));
        CapturedFrameInfo {
            frame_index: ticket.frame_index,
            viewpoint_name: viewpoint.map_or_else(String::new, |v| v.name().to_string()),
            viewpoint_postfix: viewpoint.map_or_else(String::new, |v| v.postfix().to_string()),
            extractor_name: extractor.map_or_else(String::new, |e| e.name().to_string()),
            extractor_postfix: extractor.map_or_else(String::new, |e| e.postfix().to_string()),
            kind: extractor.map_or(ExtractorKind::Rgb, |e| e.kind()),
        }
    }

    /// Release render targets, e.g. before despawn.
    pub fn release(&mut self) {
        if let Some(queue) = self.render_queue.as_ref() {
            for viewpoint in &mut self.viewpoints {
                viewpoint.release(queue);
            }
        }
    }
}
