// Standard library and external crates
use std::collections::HashMap;

use bevy::log::{info, warn};
use capture_constants::segmentation::{
    EXCLUDED_SEGMENTATION_ID, STENCIL_MAX_ID, VERTEX_COLOR_MAX_ID,
};
use serde::{Deserialize, Serialize};

// Crate modules
use crate::engine::scene::{SceneObject, SceneSnapshot};

/// Which string identifies an object for mask id purposes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskNameScheme {
    #[default]
    ActorName,
    /// Name of the first valid mesh.
    MeshName,
    FirstTag,
    ClassName,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdAssignment {
    /// 1, 2, 3 ... in scan order.
    Sequential,
    /// Ids spread over the whole encodable range so masks are easy to tell apart.
    #[default]
    SpreadEvenly,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaskEncoding {
    /// 8 bit stencil, ids 1..=255.
    #[default]
    Stencil,
    /// 32 bit vertex colour, ids 1..=u32::MAX.
    VertexColor,
}

impl MaskEncoding {
    pub fn max_id(self) -> u32 {
        match self {
            Self::Stencil => STENCIL_MAX_ID,
            Self::VertexColor => VERTEX_COLOR_MAX_ID,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorSettings {
    pub scheme: MaskNameScheme,
    pub assignment: IdAssignment,
    pub encoding: MaskEncoding,
}

impl Default for AllocatorSettings {
    fn default() -> Self {
        Self {
            scheme: MaskNameScheme::ActorName,
            assignment: IdAssignment::SpreadEvenly,
            encoding: MaskEncoding::VertexColor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationSettings {
    pub class: AllocatorSettings,
    pub instance: AllocatorSettings,
}

impl Default for SegmentationSettings {
    fn default() -> Self {
        Self {
            class: AllocatorSettings {
                scheme: MaskNameScheme::ClassName,
                assignment: IdAssignment::SpreadEvenly,
                encoding: MaskEncoding::Stencil,
            },
            instance: AllocatorSettings::default(),
        }
    }
}

/// Maps object mask names to integer ids.
///
/// Ids are rebuilt from scratch on every scan. Within one scan the mapping is
/// deterministic and stable; 0 is reserved for unnamed or unknown objects.
#[derive(Debug, Clone, Default)]
pub struct SegmentationAllocator {
    settings: AllocatorSettings,
    ids: HashMap<String, u32>,
    overflow_count: u32,
}

impl SegmentationAllocator {
    pub fn new(settings: AllocatorSettings) -> Self {
        Self {
            settings,
            ids: HashMap::new(),
            overflow_count: 0,
        }
    }

    pub fn settings(&self) -> &AllocatorSettings {
        &self.settings
    }

    /// Mask name of an object under this allocator's scheme. Empty names count as none.
    pub fn mask_name<'a>(&self, scene_object: &'a SceneObject) -> Option<&'a str> {
        let object = &scene_object.object;
        let name = match self.settings.scheme {
            MaskNameScheme::ActorName => scene_object.name.as_deref(),
            MaskNameScheme::MeshName => object
                .meshes
                .iter()
                .filter(|mesh| mesh.is_valid())
                .find_map(|mesh| mesh.name.as_deref()),
            MaskNameScheme::FirstTag => object.tags.first().map(String::as_str),
            MaskNameScheme::ClassName => object.class_name.as_deref(),
        };
        name.filter(|name| !name.is_empty())
    }

    /// Rebuild the id table from every object, in iteration order.
    pub fn scan_actors<'a>(&mut self, objects: impl IntoIterator<Item = &'a SceneObject>) {
        let mut names: Vec<String> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for object in objects {
            if let Some(name) = self.mask_name(object) {
                if seen.insert(name) {
                    names.push(name.to_string());
                }
            }
        }
        self.assign(names);
    }

    fn assign(&mut self, names: Vec<String>) {
        let max_id = self.settings.encoding.max_id() as u64;
        let count = names.len() as u64;
        let spread = self.settings.assignment == IdAssignment::SpreadEvenly && count <= max_id;
        let step = if spread && count > 0 { max_id / count } else { 1 };

        self.ids.clear();
        self.overflow_count = count.saturating_sub(max_id) as u32;

        for (index, name) in names.into_iter().enumerate() {
            let index = index as u64;
            let id = if spread {
                (index + 1) * step
            } else {
                // Past the range ids wrap to 1 and start colliding.
                (index % max_id) + 1
            };
            self.ids.insert(name, id as u32);
        }
    }

    pub fn mask_id(&self, object: &SceneObject) -> u32 {
        self.mask_name(object)
            .map_or(EXCLUDED_SEGMENTATION_ID, |name| self.mask_id_by_name(name))
    }

    pub fn mask_id_by_name(&self, name: &str) -> u32 {
        self.ids
            .get(name)
            .copied()
            .unwrap_or(EXCLUDED_SEGMENTATION_ID)
    }

    /// Names that did not fit the encodable range during the last scan.
    pub fn overflow_count(&self) -> u32 {
        self.overflow_count
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = (&str, u32)> {
        self.ids.iter().map(|(name, id)| (name.as_str(), *id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentationIds {
    pub class_id: u32,
    pub instance_id: u32,
}

/// Class and instance allocators for one capturer.
#[derive(Debug, Clone, Default)]
pub struct SceneSegmentation {
    class: SegmentationAllocator,
    instance: SegmentationAllocator,
    scanned_generation: Option<u64>,
}

impl SceneSegmentation {
    pub fn new(settings: &SegmentationSettings) -> Self {
        Self {
            class: SegmentationAllocator::new(settings.class),
            instance: SegmentationAllocator::new(settings.instance),
            scanned_generation: None,
        }
    }

    pub fn needs_rescan(&self, snapshot: &SceneSnapshot) -> bool {
        self.scanned_generation != Some(snapshot.generation)
    }

    pub fn scan(&mut self, snapshot: &SceneSnapshot) {
        self.class.scan_actors(&snapshot.objects);
        self.instance.scan_actors(&snapshot.objects);
        self.scanned_generation = Some(snapshot.generation);

        info!(
            "Segmentation scan: {} classes, {} instances",
            self.class.len(),
            self.instance.len()
        );
        for (label, allocator) in [("class", &self.class), ("instance", &self.instance)] {
            if allocator.overflow_count() > 0 {
                warn!(
                    "{} {} mask names exceed the {:?} id range and share ids",
                    allocator.overflow_count(),
                    label,
                    allocator.settings().encoding
                );
            }
        }
    }

    pub fn ids_for(&self, object: &SceneObject) -> SegmentationIds {
        SegmentationIds {
            class_id: self.class.mask_id(object),
            instance_id: self.instance.mask_id(object),
        }
    }

    pub fn class(&self) -> &SegmentationAllocator {
        &self.class
    }

    pub fn instance(&self) -> &SegmentationAllocator {
        &self.instance
    }
}
