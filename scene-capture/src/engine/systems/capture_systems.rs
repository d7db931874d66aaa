// Standard library and external crates
use bevy::prelude::*;

// Crate modules
use crate::config::CommandLineOverrides;
use crate::engine::capture::{CaptureTickContext, CapturerCompleted, SceneCapturer};
use crate::engine::manager::{SceneManager, SceneManagerRegistry};
use crate::engine::render::RenderThread;
use crate::engine::scene::{CaptureObject, SceneGeneration, SceneObject, SceneSnapshot};

/// Set by capturers whose data handler is saturated, consumed by the time valve.
#[derive(Resource, Debug, Default)]
pub struct CaptureValve {
    throttle_requested: bool,
    paused_by_capture: bool,
}

impl CaptureValve {
    pub fn request_throttle(&mut self) {
        self.throttle_requested = true;
    }

    /// True while simulation time is paused on behalf of capture.
    pub fn is_throttling(&self) -> bool {
        self.paused_by_capture
    }
}

/// Apply launch overrides, build viewpoints, and auto start unmanaged capturers.
pub fn initialize_capturers(
    mut capturers: Query<(&mut SceneCapturer, &Transform), Added<SceneCapturer>>,
    render_thread: Res<RenderThread>,
    overrides: Option<Res<CommandLineOverrides>>,
    registry: Res<SceneManagerRegistry>,
) {
    for (mut capturer, transform) in &mut capturers {
        if let Some(overrides) = overrides.as_deref() {
            if let Err(e) = capturer.apply_overrides(overrides) {
                error!("Capturer `{}` rejected launch overrides: {}", capturer.name(), e);
            }
        }

        capturer.set_local_offset(*transform);
        if !capturer.initialize(render_thread.queue().clone()) {
            continue;
        }
        // With a scene manager, capture starts when it focuses a marker.
        if capturer.settings().auto_start && registry.active().is_none() {
            capturer.start_capturing();
        }
    }
}

/// Tick every capturer against a fresh snapshot of the capturable scene.
pub fn tick_scene_capturers(
    mut capturers: Query<(Entity, &mut SceneCapturer, &Transform)>,
    objects: Query<(Entity, &Transform, &CaptureObject, Option<&Name>)>,
    managers: Query<&SceneManager>,
    registry: Res<SceneManagerRegistry>,
    generation: Res<SceneGeneration>,
    time: Res<Time>,
    real_time: Res<Time<Real>>,
    mut valve: ResMut<CaptureValve>,
    mut completed: EventWriter<CapturerCompleted>,
) {
    if capturers.is_empty() {
        return;
    }

    let snapshot = SceneSnapshot::new(
        objects
            .iter()
            .map(|(entity, transform, object, name)| SceneObject {
                entity,
                name: name.map(|name| name.as_str().to_string()),
                transform: *transform,
                object: object.clone(),
            })
            .collect(),
        generation.0,
    );
    let scene_ready = registry
        .active()
        .and_then(|manager| managers.get(manager).ok())
        .is_none_or(|manager| manager.is_ready());

    for (entity, mut capturer, transform) in &mut capturers {
        let outcome = capturer.tick(&CaptureTickContext {
            scene: &snapshot,
            scene_ready,
            delta_secs: time.delta_secs(),
            real_delta_secs: real_time.delta_secs(),
            transform,
        });

        if outcome.throttle {
            valve.request_throttle();
        }
        if let Some(success) = outcome.completed {
            completed.write(CapturerCompleted {
                capturer: entity,
                success,
            });
        }
    }
}

/// Pause virtual time while any capturer is throttled; resume only what we paused.
pub fn apply_capture_valve(mut valve: ResMut<CaptureValve>, mut time: ResMut<Time<Virtual>>) {
    let throttle = std::mem::take(&mut valve.throttle_requested);

    if throttle {
        if !time.is_paused() {
            time.pause();
            valve.paused_by_capture = true;
            debug!("Simulation paused, capture data handler saturated");
        }
    } else if valve.paused_by_capture {
        time.unpause();
        valve.paused_by_capture = false;
        debug!("Simulation resumed");
    }
}
