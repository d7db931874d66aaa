// Standard library and external crates
use bevy::prelude::*;

// Crate modules
use crate::engine::scene::{CaptureObject, SceneGeneration};

/// Bump the scene generation when capture objects appear or disappear,
/// so running capturers rescan segmentation ids.
pub fn track_scene_changes(
    added: Query<(), Added<CaptureObject>>,
    mut removed: RemovedComponents<CaptureObject>,
    mut generation: ResMut<SceneGeneration>,
) {
    let removed_any = removed.read().count() > 0;
    if removed_any || !added.is_empty() {
        generation.0 += 1;
        debug!("Scene generation {}", generation.0);
    }
}
