// Standard library and external crates
use bevy::math::{Mat4, Vec3};
use bevy::prelude::Transform;
use serde::Serialize;

// Crate modules
use crate::engine::camera::{CameraIntrinsics, CameraSettings, ViewInfo};
use crate::engine::cuboid::CuboidData;
use crate::engine::scene::{SceneObject, SceneSnapshot};
use crate::engine::segmentation::SceneSegmentation;

/// Per-frame annotation document. Poses are in camera space (x right, y up,
/// looking down -z); 2D coordinates are pixels from the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameAnnotation {
    pub camera_data: CameraData,
    pub objects: Vec<ObjectAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraData {
    pub location_worldframe: [f32; 3],
    pub quaternion_xyzw_worldframe: [f32; 4],
    /// Present when the camera was randomised for this frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intrinsics: Option<CameraIntrinsics>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundingBox2d {
    pub top_left: [f32; 2],
    pub bottom_right: [f32; 2],
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectAnnotation {
    pub class: String,
    pub instance_id: u32,
    pub visibility: f32,
    pub bounding_box: BoundingBox2d,
    #[serde(flatten)]
    pub pose: Option<ObjectPose>,
}

/// Full 6-DoF part of an object annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectPose {
    pub location: [f32; 3],
    pub quaternion_xyzw: [f32; 4],
    /// Row-major camera-from-object transform.
    pub pose_transform: [[f32; 4]; 4],
    pub cuboid_centroid: [f32; 3],
    pub projected_cuboid_centroid: [f32; 2],
    pub cuboid: [[f32; 3]; 8],
    pub projected_cuboid: [[f32; 2]; 8],
}

impl FrameAnnotation {
    /// Annotate every visible object of the snapshot from `view`.
    ///
    /// Objects behind the camera, without geometry or entirely outside the
    /// image are left out. `with_pose` selects full 3D output over 2D boxes.
    pub fn capture(
        scene: &SceneSnapshot,
        segmentation: &SceneSegmentation,
        view: &ViewInfo,
        intrinsics: Option<CameraIntrinsics>,
        with_pose: bool,
    ) -> Self {
        let view_from_world = view.view_from_world();
        let clip_from_world = view.clip_from_world();

        let objects = scene
            .objects
            .iter()
            .filter(|object| object.object.export_annotations)
            .filter_map(|object| {
                annotate_object(
                    object,
                    segmentation,
                    &view_from_world,
                    &clip_from_world,
                    view,
                    with_pose,
                )
            })
            .collect();

        Self {
            camera_data: CameraData {
                location_worldframe: view.camera.translation.to_array(),
                quaternion_xyzw_worldframe: view.camera.rotation.to_array(),
                intrinsics,
            },
            objects,
        }
    }
}

fn annotate_object(
    scene_object: &SceneObject,
    segmentation: &SceneSegmentation,
    view_from_world: &Mat4,
    clip_from_world: &Mat4,
    view: &ViewInfo,
    with_pose: bool,
) -> Option<ObjectAnnotation> {
    let object = &scene_object.object;
    let cuboid = CuboidData::from_meshes(
        &object.meshes,
        &scene_object.transform,
        object.cuboid_strategy,
    );
    let projected = cuboid.project(clip_from_world, view.size, true)?;
    if projected.visibility <= 0.0 {
        return None;
    }

    let ids = segmentation.ids_for(scene_object);
    let class = object
        .class_name
        .clone()
        .or_else(|| scene_object.name.clone())
        .unwrap_or_default();
    let bounding_box = BoundingBox2d {
        top_left: projected.bounding_box.min.to_array(),
        bottom_right: projected.bounding_box.max.to_array(),
    };

    let pose = with_pose.then(|| {
        let view_from_object = *view_from_world * scene_object.transform.compute_matrix();
        let (_, rotation, location) = view_from_object.to_scale_rotation_translation();
        let to_camera = |v: Vec3| view_from_world.transform_point3(v).to_array();

        ObjectPose {
            location: location.to_array(),
            quaternion_xyzw: rotation.to_array(),
            pose_transform: view_from_object.transpose().to_cols_array_2d(),
            cuboid_centroid: to_camera(cuboid.center()),
            projected_cuboid_centroid: projected.center.to_array(),
            cuboid: cuboid.vertices.map(to_camera),
            projected_cuboid: projected.vertices.map(|v| v.to_array()),
        }
    });

    Some(ObjectAnnotation {
        class,
        instance_id: ids.instance_id,
        visibility: projected.visibility,
        bounding_box,
        pose,
    })
}

/// One exportable object of the `_object_settings.json` file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedObject {
    pub class: String,
    pub segmentation_class_id: u32,
    pub segmentation_instance_id: u32,
    /// Row-major object-from-cuboid transform.
    pub fixed_model_transform: [[f32; 4]; 4],
    pub cuboid_dimensions: [f32; 3],
}

impl ExportedObject {
    pub fn from_scene_object(
        scene_object: &SceneObject,
        segmentation: &SceneSegmentation,
    ) -> Option<Self> {
        let object = &scene_object.object;
        let local = CuboidData::from_meshes(
            &object.meshes,
            &Transform::IDENTITY,
            object.cuboid_strategy,
        );
        if !local.is_valid() {
            return None;
        }

        let ids = segmentation.ids_for(scene_object);
        let object_from_cuboid = Mat4::from_rotation_translation(local.rotation(), local.center());
        Some(Self {
            class: object
                .class_name
                .clone()
                .or_else(|| scene_object.name.clone())
                .unwrap_or_default(),
            segmentation_class_id: ids.class_id,
            segmentation_instance_id: ids.instance_id,
            fixed_model_transform: object_from_cuboid.transpose().to_cols_array_2d(),
            cuboid_dimensions: local.dimension().to_array(),
        })
    }
}

/// One viewpoint of the `_camera_settings.json` file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraDescription {
    pub name: String,
    pub horizontal_fov: f32,
    pub intrinsic_settings: CameraIntrinsics,
    pub captured_image_size: CapturedImageSize,
    /// Row-major clip-from-view matrix.
    pub projection_matrix: [[f32; 4]; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CapturedImageSize {
    pub width: u32,
    pub height: u32,
}

impl CameraDescription {
    pub fn new(name: impl Into<String>, camera: &CameraSettings) -> Self {
        Self {
            name: name.into(),
            horizontal_fov: camera.horizontal_fov_degrees,
            intrinsic_settings: camera.intrinsics(),
            captured_image_size: CapturedImageSize {
                width: camera.width,
                height: camera.height,
            },
            projection_matrix: camera.projection_matrix().transpose().to_cols_array_2d(),
        }
    }
}
