use std::sync::Arc;

use bevy::prelude::*;
use capture_export::FileDataHandler;
use scene_capture::engine::capture::{FeatureExtractorSettings, PoseSettings, ViewpointSettings};
use scene_capture::prelude::*;

/// Name of the capturer spawned by the demo scene.
pub const DEMO_CAPTURER: &str = "rig";

fn demo_capturer_settings() -> CapturerSettings {
    let mut settings = CapturerSettings {
        max_frames: 10,
        capture_interval_secs: 0.1,
        ..Default::default()
    };
    settings.feature_extractors = vec![
        FeatureExtractorSettings::new(ExtractorKind::Rgb),
        FeatureExtractorSettings::new(ExtractorKind::Depth { quantized: true }),
        FeatureExtractorSettings::new(ExtractorKind::StencilMask),
        FeatureExtractorSettings::new(ExtractorKind::VertexColorMask),
        FeatureExtractorSettings::new(ExtractorKind::ObjectAnnotations),
        FeatureExtractorSettings::new(ExtractorKind::BoundingBoxes),
    ];
    // Stereo pair 12 cm apart.
    settings.viewpoints = [("left", -0.06), ("right", 0.06)]
        .into_iter()
        .map(|(name, x)| ViewpointSettings {
            display_name: name.to_string(),
            file_name_postfix: name.to_string(),
            pose: PoseSettings {
                translation: [x, 0.0, 0.0],
                rotation_degrees: [0.0, 0.0, 0.0],
            },
            ..Default::default()
        })
        .collect();
    settings
}

fn spawn_box(commands: &mut Commands, name: &str, class: &str, color: [f32; 4], half: Vec3, at: Vec3) {
    commands.spawn((
        Name::new(name.to_string()),
        Transform::from_translation(at),
        CaptureObject::new(class)
            .with_color(color)
            .with_mesh(Arc::new(MeshData::cuboid(name, half))),
    ));
}

/// Ground slab, a handful of boxes, two markers and one stereo capturer.
pub fn spawn_demo_scene(mut commands: Commands) {
    commands.spawn((
        Name::new("ground"),
        Transform::from_xyz(0.0, -0.05, 0.0),
        CaptureObject::new("ground")
            .with_color([0.4, 0.4, 0.4, 1.0])
            .with_mesh(Arc::new(MeshData::cuboid("ground", Vec3::new(10.0, 0.05, 10.0))))
            .without_annotations(),
    ));

    spawn_box(&mut commands, "crate_a", "crate", [0.8, 0.5, 0.2, 1.0], Vec3::splat(0.5), Vec3::new(-1.5, 0.5, 0.0));
    spawn_box(&mut commands, "crate_b", "crate", [0.7, 0.4, 0.1, 1.0], Vec3::splat(0.4), Vec3::new(1.2, 0.4, -1.0));
    spawn_box(&mut commands, "pillar", "pillar", [0.2, 0.3, 0.9, 1.0], Vec3::new(0.3, 1.5, 0.3), Vec3::new(0.0, 1.5, -2.5));
    commands.spawn((
        Name::new("tilted_plank"),
        Transform::from_xyz(0.5, 0.2, 1.5).with_rotation(Quat::from_rotation_y(0.6)),
        CaptureObject::new("plank")
            .with_color([0.9, 0.8, 0.3, 1.0])
            .with_cuboid_strategy(CuboidStrategy::Pca)
            .with_mesh(Arc::new(MeshData::cuboid("plank", Vec3::new(1.0, 0.05, 0.2)))),
    ));

    commands.spawn(SceneManager::new(SceneManagerSettings {
        auto_exit_when_captured: true,
    }));
    commands.spawn((
        SceneMarker::new("south", 0),
        Transform::from_xyz(0.0, 1.6, 6.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));
    commands.spawn((
        SceneMarker::new("east", 1),
        Transform::from_xyz(6.0, 2.0, 0.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    match SceneCapturer::new(DEMO_CAPTURER, demo_capturer_settings()) {
        Ok(capturer) => {
            commands.spawn((
                Transform::IDENTITY,
                capturer.with_data_handler(FileDataHandler::new()),
            ));
        }
        Err(e) => error!("Demo capturer settings rejected: {}", e),
    }
}
