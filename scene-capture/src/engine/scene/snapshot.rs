// Standard library and external crates
use std::sync::Arc;

use bevy::prelude::{Entity, Resource, Transform};

// Crate modules
use super::{CaptureObject, MeshData};
use crate::engine::segmentation::SceneSegmentation;

/// Bumped whenever capture objects are added or removed.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneGeneration(pub u64);

/// One capturable object as seen at snapshot time.
#[derive(Debug, Clone)]
pub struct SceneObject {
    pub entity: Entity,
    pub name: Option<String>,
    pub transform: Transform,
    pub object: CaptureObject,
}

/// Capturable objects of the scene, ordered by entity.
#[derive(Debug, Clone, Default)]
pub struct SceneSnapshot {
    pub objects: Vec<SceneObject>,
    pub generation: u64,
}

impl SceneSnapshot {
    pub fn new(mut objects: Vec<SceneObject>, generation: u64) -> Self {
        objects.sort_by_key(|object| object.entity);
        Self {
            objects,
            generation,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderObject {
    pub transform: Transform,
    pub meshes: Vec<Arc<MeshData>>,
    pub color: [f32; 4],
    pub class_id: u32,
    pub instance_id: u32,
}

/// Immutable copy of the scene handed to the render worker.
#[derive(Debug, Clone, Default)]
pub struct RenderScene {
    pub objects: Vec<RenderObject>,
}

impl RenderScene {
    pub fn from_snapshot(snapshot: &SceneSnapshot, segmentation: &SceneSegmentation) -> Self {
        let objects = snapshot
            .objects
            .iter()
            .map(|scene_object| {
                let ids = segmentation.ids_for(scene_object);
                RenderObject {
                    transform: scene_object.transform,
                    meshes: scene_object.object.meshes.clone(),
                    color: scene_object.object.color,
                    class_id: ids.class_id,
                    instance_id: ids.instance_id,
                }
            })
            .collect();

        Self { objects }
    }
}
