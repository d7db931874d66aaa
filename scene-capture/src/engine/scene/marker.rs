use bevy::prelude::Component;

/// Point of interest the scene manager moves capturers to, in ascending `order`.
#[derive(Component, Debug, Clone, PartialEq, Eq)]
pub struct SceneMarker {
    pub name: String,
    pub order: i32,
}

impl SceneMarker {
    pub fn new(name: impl Into<String>, order: i32) -> Self {
        Self {
            name: name.into(),
            order,
        }
    }
}
