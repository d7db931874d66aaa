// Standard library and external crates
use bevy::prelude::*;

// Crate modules
use crate::engine::capture::CapturerCompleted;
use crate::engine::manager::{SceneCaptured, SceneManagerRegistry};
use crate::engine::render::{RenderThread, SceneRenderer, SoftwareRasterizer};
use crate::engine::scene::SceneGeneration;
use crate::engine::systems::{
    capture_systems::{CaptureValve, apply_capture_valve, initialize_capturers, tick_scene_capturers},
    manager_systems::{register_scene_managers, update_scene_managers},
    scene_tracking::track_scene_changes,
};

/// Systems that drive capture, in `Update`. Order your own scene
/// mutation before this set so captures see the current frame.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneCaptureSet;

fn software_rasterizer() -> Box<dyn SceneRenderer> {
    Box::new(SoftwareRasterizer::default())
}

pub struct SceneCapturePlugin {
    /// Render on a dedicated worker thread. When false, render commands run
    /// synchronously on the submitting thread.
    pub threaded_rendering: bool,
    pub renderer: fn() -> Box<dyn SceneRenderer>,
}

impl Default for SceneCapturePlugin {
    fn default() -> Self {
        Self {
            threaded_rendering: true,
            renderer: software_rasterizer,
        }
    }
}

impl Plugin for SceneCapturePlugin {
    fn build(&self, app: &mut App) {
        let render_thread = if self.threaded_rendering {
            match RenderThread::spawn((self.renderer)()) {
                Ok(thread) => thread,
                Err(e) => {
                    warn!("Render worker unavailable ({}), rendering inline", e);
                    RenderThread::inline((self.renderer)())
                }
            }
        } else {
            RenderThread::inline((self.renderer)())
        };

        app.insert_resource(render_thread)
            .init_resource::<SceneManagerRegistry>()
            .init_resource::<SceneGeneration>()
            .init_resource::<CaptureValve>()
            .add_event::<CapturerCompleted>()
            .add_event::<SceneCaptured>()
            .add_systems(
                Update,
                (
                    track_scene_changes,
                    register_scene_managers,
                    initialize_capturers,
                    update_scene_managers,
                    tick_scene_capturers,
                    apply_capture_valve,
                )
                    .chain()
                    .in_set(SceneCaptureSet),
            );
    }
}
