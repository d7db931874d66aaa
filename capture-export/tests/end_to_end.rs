use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use capture_export::FileDataHandler;
use scene_capture::engine::capture::FeatureExtractorSettings;
use scene_capture::prelude::*;
use serde_json::Value;

fn capture_app(root: &Path, settings_patch: impl FnOnce(&mut CapturerSettings)) -> App {
    let mut settings = CapturerSettings {
        max_frames: 3,
        ..Default::default()
    };
    settings.camera.width = 64;
    settings.camera.height = 48;
    settings.output.root_directory = root.to_path_buf();
    settings.feature_extractors = vec![
        FeatureExtractorSettings::new(ExtractorKind::Rgb),
        FeatureExtractorSettings::new(ExtractorKind::Depth { quantized: true }),
        FeatureExtractorSettings::new(ExtractorKind::ObjectAnnotations),
    ];
    settings_patch(&mut settings);

    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(50)))
        .add_plugins(SceneCapturePlugin {
            threaded_rendering: false,
            ..Default::default()
        });

    app.world_mut().spawn((
        Name::new("crate_a"),
        Transform::from_xyz(0.0, 0.0, -4.0),
        CaptureObject::new("crate")
            .with_color([0.8, 0.5, 0.2, 1.0])
            .with_mesh(Arc::new(MeshData::cuboid("crate", Vec3::splat(0.5)))),
    ));
    app.world_mut().spawn((
        Transform::IDENTITY,
        SceneCapturer::new("front", settings)
            .unwrap()
            .with_data_handler(FileDataHandler::new()),
    ));
    app
}

fn run_until_completed(app: &mut App) -> CapturerState {
    let mut capturers = app.world_mut().query::<&SceneCapturer>();
    for _ in 0..1000 {
        app.update();
        let state = capturers.single(app.world()).unwrap().state();
        if state == CapturerState::Completed {
            return state;
        }
        // Give the export thread a chance to drain.
        std::thread::sleep(Duration::from_millis(1));
    }
    capturers.single(app.world()).unwrap().state()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

#[test]
fn session_writes_images_annotations_and_settings() {
    let root = tempfile::tempdir().unwrap();
    let mut app = capture_app(root.path(), |_| {});

    assert_eq!(run_until_completed(&mut app), CapturerState::Completed);

    let session = root.path().join("front");
    for index in 0..3 {
        assert!(session.join(format!("{:06}.png", index)).exists());
        assert!(session.join(format!("{:06}.depth.16.png", index)).exists());
        assert!(session.join(format!("{:06}.json", index)).exists());
    }
    assert!(!session.join("000003.png").exists());

    let objects = read_json(&session.join("_object_settings.json"));
    assert_eq!(objects["exported_object_classes"], serde_json::json!(["crate"]));
    assert_eq!(objects["exported_objects"][0]["class"], "crate");

    let cameras = read_json(&session.join("_camera_settings.json"));
    assert_eq!(cameras["camera_settings"][0]["captured_image_size"]["width"], 64);

    let frame = read_json(&session.join("000001.json"));
    let annotated = frame["objects"].as_array().unwrap();
    assert_eq!(annotated.len(), 1);
    assert_eq!(annotated[0]["class"], "crate");
    assert_eq!(annotated[0]["cuboid"].as_array().unwrap().len(), 8);

    let depth = image::open(session.join("000000.depth.16.png")).unwrap();
    assert_eq!(depth.color(), image::ColorType::L16);
    // Box face 3.5 units away, quantised to centimetres.
    let centre = depth.to_luma16().get_pixel(32, 24).0[0];
    assert!((345..=355).contains(&centre), "depth {}", centre);

    let rgb = image::open(session.join("000000.png")).unwrap().to_rgba8();
    assert_eq!(rgb.dimensions(), (64, 48));
    assert_ne!(rgb.get_pixel(32, 24).0, rgb.get_pixel(0, 0).0);
}

#[test]
fn clean_directory_policy_removes_stale_frames() {
    let root = tempfile::tempdir().unwrap();
    let session = root.path().join("front");
    fs::create_dir_all(&session).unwrap();
    fs::write(session.join("999999.png"), b"stale").unwrap();

    let mut app = capture_app(root.path(), |settings| {
        settings.max_frames = 1;
        settings.output.directory_conflict = DirectoryConflictPolicy::CleanDirectory;
        settings.output.image_format = ImageFormat::Jpeg;
    });
    assert_eq!(run_until_completed(&mut app), CapturerState::Completed);

    assert!(!session.join("999999.png").exists());
    assert!(session.join("000000.jpeg").exists());
    assert!(session.join("000000.depth.16.jpeg").exists());
}
