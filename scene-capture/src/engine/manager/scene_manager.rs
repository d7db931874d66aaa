// Standard library and external crates
use std::collections::HashMap;

use bevy::log::{info, warn};
use bevy::prelude::{Component, Entity, Event, Resource};
use serde::{Deserialize, Serialize};

// Crate modules
use crate::engine::capture::CapturerState;
use crate::error::CaptureError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SceneManagerState {
    /// Unregistered, or rejected because another manager is active.
    #[default]
    NotActive,
    /// Registered; between points of interest.
    Active,
    /// Capturers are placed and capturing at the current point of interest.
    Ready,
    /// Every point of interest has been captured.
    Captured,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneManagerSettings {
    /// Send `AppExit` once every point of interest is captured.
    pub auto_exit_when_captured: bool,
}

/// Outcome of moving to the next point of interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerFocus {
    /// Capturers go to the marker at this index in marker order.
    Marker(usize),
    /// No markers exist; capture once where the capturers stand.
    InPlace,
    /// Nothing left to capture.
    Exhausted,
}

/// Walks capturers through the scene markers one at a time.
#[derive(Component, Debug, Default)]
pub struct SceneManager {
    settings: SceneManagerSettings,
    state: SceneManagerState,
    focus_index: Option<usize>,
    attached: Vec<Entity>,
    completed: HashMap<Entity, bool>,
}

impl SceneManager {
    pub fn new(settings: SceneManagerSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn settings(&self) -> &SceneManagerSettings {
        &self.settings
    }

    pub fn state(&self) -> SceneManagerState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == SceneManagerState::Ready
    }

    /// Index of the marker currently being captured.
    pub fn current_marker(&self) -> Option<usize> {
        self.focus_index
    }

    pub fn attached_capturers(&self) -> &[Entity] {
        &self.attached
    }

    pub(crate) fn activate(&mut self) {
        if self.state == SceneManagerState::NotActive {
            self.state = SceneManagerState::Active;
        }
    }

    pub(crate) fn deactivate(&mut self) {
        self.state = SceneManagerState::NotActive;
        self.attached.clear();
        self.completed.clear();
    }

    /// Advance to the next point of interest.
    ///
    /// Only valid while `Active` and while no capturer is still capturing.
    /// `capturers` lists every capturer that should capture at the new point.
    pub fn focus_next_marker(
        &mut self,
        marker_count: usize,
        capturers: &[(Entity, CapturerState)],
    ) -> Result<MarkerFocus, CaptureError> {
        if self.state != SceneManagerState::Active {
            return Err(CaptureError::InvalidState(format!(
                "scene manager cannot focus while {:?}",
                self.state
            )));
        }
        let busy = capturers.iter().any(|(_, state)| {
            matches!(state, CapturerState::Running | CapturerState::Paused)
        });
        debug_assert!(!busy, "focus_next_marker called while capturers are capturing");
        if busy {
            return Err(CaptureError::InvalidState(
                "capturers are still capturing".to_string(),
            ));
        }

        let next = self.focus_index.map_or(0, |index| index + 1);
        // Without markers the scene itself is the single point of interest.
        if next >= marker_count.max(1) {
            self.state = SceneManagerState::Captured;
            self.attached.clear();
            info!("✓ Scene captured at {} point(s) of interest", marker_count.max(1));
            return Ok(MarkerFocus::Exhausted);
        }

        self.focus_index = Some(next);
        self.attached = capturers
            .iter()
            .filter(|(_, state)| *state != CapturerState::NotActive)
            .map(|(entity, _)| *entity)
            .collect();
        self.completed.clear();
        self.state = SceneManagerState::Ready;

        if marker_count == 0 {
            Ok(MarkerFocus::InPlace)
        } else {
            Ok(MarkerFocus::Marker(next))
        }
    }

    /// Record a finished capturer. Returns true once every attached capturer
    /// is done and the manager is back in `Active`.
    pub fn on_capturer_completed(&mut self, capturer: Entity, success: bool) -> bool {
        if self.state != SceneManagerState::Ready || !self.attached.contains(&capturer) {
            return false;
        }
        if !success {
            warn!("Capturer {:?} reported failures at this point of interest", capturer);
        }
        self.completed.insert(capturer, success);
        self.settle()
    }

    /// True when nothing attached is left to wait for, including when
    /// nothing was attached at all.
    pub fn all_attached_completed(&self) -> bool {
        self.attached
            .iter()
            .all(|capturer| self.completed.contains_key(capturer))
    }

    /// Drop a despawned capturer from the current point of interest.
    pub fn forget_capturer(&mut self, capturer: Entity) {
        self.attached.retain(|attached| *attached != capturer);
        self.completed.remove(&capturer);
        self.settle();
    }

    /// Ready -> Active when nothing attached is left to wait for.
    pub fn settle(&mut self) -> bool {
        if self.state == SceneManagerState::Ready && self.all_attached_completed() {
            self.state = SceneManagerState::Active;
            return true;
        }
        false
    }
}

/// Process-wide slot for the single active scene manager.
#[derive(Resource, Debug, Default)]
pub struct SceneManagerRegistry {
    active: Option<Entity>,
}

impl SceneManagerRegistry {
    /// First registration wins; later managers are rejected.
    pub fn register(&mut self, manager: Entity) -> Result<(), CaptureError> {
        match self.active {
            Some(existing) if existing != manager => Err(CaptureError::ManagerAlreadyRegistered {
                existing,
                rejected: manager,
            }),
            _ => {
                self.active = Some(manager);
                Ok(())
            }
        }
    }

    pub fn unregister(&mut self, manager: Entity) {
        if self.active == Some(manager) {
            self.active = None;
        }
    }

    pub fn active(&self) -> Option<Entity> {
        self.active
    }
}

/// Sent once when the active manager has captured every point of interest.
#[derive(Event, Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneCaptured {
    pub manager: Entity,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn active_manager() -> SceneManager {
        let mut manager = SceneManager::default();
        manager.activate();
        manager
    }

    #[test]
    fn walks_markers_in_order() {
        let capturer = Entity::from_raw(1);
        let mut manager = active_manager();

        for expected in 0..2 {
            let focus = manager
                .focus_next_marker(2, &[(capturer, CapturerState::Active)])
                .unwrap();
            assert_eq!(focus, MarkerFocus::Marker(expected));
            assert!(manager.is_ready());
            assert!(manager.on_capturer_completed(capturer, true));
            assert_eq!(manager.state(), SceneManagerState::Active);
        }

        let focus = manager
            .focus_next_marker(2, &[(capturer, CapturerState::Completed)])
            .unwrap();
        assert_eq!(focus, MarkerFocus::Exhausted);
        assert_eq!(manager.state(), SceneManagerState::Captured);
    }

    #[test]
    fn no_markers_means_one_in_place_capture() {
        let mut manager = active_manager();
        assert_eq!(manager.focus_next_marker(0, &[]).unwrap(), MarkerFocus::InPlace);
        assert!(manager.all_attached_completed());
        assert!(manager.settle());
        assert_eq!(
            manager.focus_next_marker(0, &[]).unwrap(),
            MarkerFocus::Exhausted
        );
    }

    #[test]
    fn waits_for_every_attached_capturer() {
        let (a, b) = (Entity::from_raw(1), Entity::from_raw(2));
        let mut manager = active_manager();
        manager
            .focus_next_marker(1, &[(a, CapturerState::Active), (b, CapturerState::Active)])
            .unwrap();

        assert!(!manager.on_capturer_completed(a, false));
        assert!(manager.is_ready());
        assert!(manager.on_capturer_completed(b, true));
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "capturers are capturing"))]
    fn refuses_to_move_running_capturers() {
        let mut manager = active_manager();
        assert!(manager
            .focus_next_marker(1, &[(Entity::from_raw(1), CapturerState::Running)])
            .is_err());
    }

    #[test]
    fn second_manager_is_rejected() {
        let mut registry = SceneManagerRegistry::default();
        registry.register(Entity::from_raw(1)).unwrap();
        registry.register(Entity::from_raw(1)).unwrap();
        assert!(matches!(
            registry.register(Entity::from_raw(2)),
            Err(CaptureError::ManagerAlreadyRegistered { .. })
        ));
        assert_eq!(registry.active(), Some(Entity::from_raw(1)));
    }
}
