// Standard library and external crates
use std::sync::Arc;

use bevy::math::Vec3;
use bevy::prelude::Component;

// Crate modules
use crate::engine::cuboid::CuboidStrategy;

/// Triangle mesh geometry in object-local space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub name: Option<String>,
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(name: impl Into<String>, positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self {
            name: Some(name.into()),
            positions,
            indices,
        }
    }

    /// Axis aligned box centred on the origin.
    pub fn cuboid(name: impl Into<String>, half_extents: Vec3) -> Self {
        let Vec3 { x, y, z } = half_extents;
        let positions = vec![
            Vec3::new(-x, -y, -z),
            Vec3::new(x, -y, -z),
            Vec3::new(x, y, -z),
            Vec3::new(-x, y, -z),
            Vec3::new(-x, -y, z),
            Vec3::new(x, -y, z),
            Vec3::new(x, y, z),
            Vec3::new(-x, y, z),
        ];
        #[rustfmt::skip]
        let indices = vec![
            0, 2, 1, 0, 3, 2, // back
            4, 5, 6, 4, 6, 7, // front
            0, 1, 5, 0, 5, 4, // bottom
            3, 7, 6, 3, 6, 2, // top
            0, 4, 7, 0, 7, 3, // left
            1, 2, 6, 1, 6, 5, // right
        ];
        Self::new(name, positions, indices)
    }

    /// Meshes without vertices are ignored by rendering and cuboid fitting.
    pub fn is_valid(&self) -> bool {
        !self.positions.is_empty()
    }
}

/// Marks an entity as capturable and carries what the pipeline needs to
/// render, segment and annotate it.
#[derive(Component, Debug, Clone)]
pub struct CaptureObject {
    pub class_name: Option<String>,
    pub tags: Vec<String>,
    pub meshes: Vec<Arc<MeshData>>,
    /// Linear RGBA used by the colour pass.
    pub color: [f32; 4],
    pub cuboid_strategy: CuboidStrategy,
    /// Include this object in per-frame annotations.
    pub export_annotations: bool,
}

impl Default for CaptureObject {
    fn default() -> Self {
        Self {
            class_name: None,
            tags: Vec::new(),
            meshes: Vec::new(),
            color: [0.8, 0.8, 0.8, 1.0],
            cuboid_strategy: CuboidStrategy::Simple,
            export_annotations: true,
        }
    }
}

impl CaptureObject {
    pub fn new(class_name: impl Into<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
            ..Default::default()
        }
    }

    pub fn with_mesh(mut self, mesh: Arc<MeshData>) -> Self {
        self.meshes.push(mesh);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    pub fn with_cuboid_strategy(mut self, strategy: CuboidStrategy) -> Self {
        self.cuboid_strategy = strategy;
        self
    }

    pub fn without_annotations(mut self) -> Self {
        self.export_annotations = false;
        self
    }
}
