// Standard library and external crates
use bevy::prelude::*;

// Crate modules
use crate::engine::capture::{CapturerCompleted, CapturerState, SceneCapturer};
use crate::engine::manager::{
    MarkerFocus, SceneCaptured, SceneManager, SceneManagerRegistry, SceneManagerState,
};
use crate::engine::scene::SceneMarker;

/// Activate the first scene manager; any later one stays `NotActive`.
pub fn register_scene_managers(
    mut registry: ResMut<SceneManagerRegistry>,
    mut added: Query<(Entity, &mut SceneManager), Added<SceneManager>>,
    mut removed: RemovedComponents<SceneManager>,
) {
    for entity in removed.read() {
        registry.unregister(entity);
    }

    let mut added: Vec<_> = added.iter_mut().collect();
    added.sort_by_key(|(entity, _)| *entity);
    for (entity, mut manager) in added {
        match registry.register(entity) {
            Ok(()) => {
                manager.activate();
                info!("Scene manager {:?} registered", entity);
            }
            Err(e) => {
                warn!("{}", e);
                manager.deactivate();
            }
        }
    }
}

/// Collect capturer completions and move capturers to the next marker once
/// every one of them is done at the current one.
pub fn update_scene_managers(
    registry: Res<SceneManagerRegistry>,
    mut managers: Query<&mut SceneManager>,
    markers: Query<(&SceneMarker, &Transform), Without<SceneCapturer>>,
    mut capturers: Query<(Entity, &mut SceneCapturer, &mut Transform), Without<SceneMarker>>,
    mut removed_capturers: RemovedComponents<SceneCapturer>,
    mut completed_events: EventReader<CapturerCompleted>,
    mut captured_events: EventWriter<SceneCaptured>,
    mut exit: EventWriter<AppExit>,
) {
    let completions: Vec<CapturerCompleted> = completed_events.read().copied().collect();
    let removed: Vec<Entity> = removed_capturers.read().collect();
    let Some(manager_entity) = registry.active() else {
        return;
    };
    let Ok(mut manager) = managers.get_mut(manager_entity) else {
        return;
    };

    for entity in removed {
        manager.forget_capturer(entity);
    }
    for event in completions {
        manager.on_capturer_completed(event.capturer, event.success);
    }
    manager.settle();
    if manager.state() != SceneManagerState::Active {
        return;
    }

    // Capturers spawned this frame are initialised before this system runs;
    // anything still uninitialised is waiting on something else.
    let initializing = capturers.iter().any(|(_, capturer, _)| {
        capturer.state() == CapturerState::NotActive && capturer.settings().active
    });
    if initializing {
        return;
    }

    for (_, mut capturer, _) in &mut capturers {
        capturer.reset_for_next_session();
    }
    let states: Vec<(Entity, CapturerState)> = capturers
        .iter()
        .map(|(entity, capturer, _)| (entity, capturer.state()))
        .collect();

    let mut ordered: Vec<(&SceneMarker, &Transform)> = markers.iter().collect();
    ordered.sort_by(|(a, _), (b, _)| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));

    match manager.focus_next_marker(ordered.len(), &states) {
        Ok(MarkerFocus::Marker(index)) => {
            let (marker, marker_transform) = ordered[index];
            info!("→ Capturing at marker `{}` ({}/{})", marker.name, index + 1, ordered.len());
            for (_, mut capturer, mut transform) in &mut capturers {
                if capturer.state() != CapturerState::Active {
                    continue;
                }
                // Detach from the previous marker, attach to this one.
                *transform = marker_transform.mul_transform(capturer.local_offset());
                capturer.set_marker_name(Some(marker.name.clone()));
                capturer.start_capturing();
            }
        }
        Ok(MarkerFocus::InPlace) => {
            info!("→ No scene markers, capturing in place");
            for (_, mut capturer, _) in &mut capturers {
                if capturer.state() == CapturerState::Active {
                    capturer.set_marker_name(None);
                    capturer.start_capturing();
                }
            }
        }
        Ok(MarkerFocus::Exhausted) => {
            captured_events.write(SceneCaptured {
                manager: manager_entity,
            });
            if manager.settings().auto_exit_when_captured {
                info!("Scene captured, exiting");
                exit.write(AppExit::Success);
            }
        }
        Err(e) => warn!("Scene manager could not advance: {}", e),
    }

    // Nothing attached means nothing to wait for.
    manager.settle();
}
