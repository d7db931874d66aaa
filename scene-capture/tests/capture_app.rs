use std::sync::{Arc, Mutex};
use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use scene_capture::engine::capture::{CaptureSession, CapturedFrameInfo, DataHandler};
use scene_capture::prelude::*;

#[derive(Default)]
struct Recorded {
    sessions: Vec<Option<String>>,
    pixel_files: Vec<String>,
    annotated_objects: Vec<usize>,
    stops: u32,
}

#[derive(Clone, Default)]
struct SharedHandler {
    recorded: Arc<Mutex<Recorded>>,
    saturated: Arc<Mutex<bool>>,
}

impl DataHandler for SharedHandler {
    fn on_start_capturing(&mut self, session: &CaptureSession) -> Result<(), CaptureError> {
        self.recorded
            .lock()
            .unwrap()
            .sessions
            .push(session.marker_name.clone());
        Ok(())
    }

    fn on_stop_capturing(&mut self) {
        self.recorded.lock().unwrap().stops += 1;
    }

    fn can_handle_more_data(&self) -> bool {
        !*self.saturated.lock().unwrap()
    }

    fn is_handling_data(&self) -> bool {
        false
    }

    fn handle_pixel_data(&mut self, _pixels: PixelBuffer, frame: &CapturedFrameInfo) {
        self.recorded
            .lock()
            .unwrap()
            .pixel_files
            .push(frame.file_name("png"));
    }

    fn handle_annotation_data(&mut self, annotation: &FrameAnnotation, _frame: &CapturedFrameInfo) {
        self.recorded
            .lock()
            .unwrap()
            .annotated_objects
            .push(annotation.objects.len());
    }
}

#[derive(Resource, Default)]
struct CapturedScenes(u32);

fn count_captured_scenes(mut events: EventReader<SceneCaptured>, mut count: ResMut<CapturedScenes>) {
    count.0 += events.read().count() as u32;
}

fn capture_settings(max_frames: u32) -> CapturerSettings {
    let mut settings = CapturerSettings {
        max_frames,
        ..Default::default()
    };
    settings.camera.width = 32;
    settings.camera.height = 24;
    settings
}

fn test_app() -> App {
    let mut app = App::new();
    app.add_plugins(MinimalPlugins)
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_millis(100)))
        .add_plugins(SceneCapturePlugin {
            threaded_rendering: false,
            ..Default::default()
        })
        .init_resource::<CapturedScenes>()
        .add_systems(Update, count_captured_scenes.after(SceneCaptureSet));
    app
}

fn spawn_box(app: &mut App, class: &str, translation: Vec3) {
    app.world_mut().spawn((
        Name::new(class.to_string()),
        Transform::from_translation(translation),
        CaptureObject::new(class).with_mesh(Arc::new(MeshData::cuboid(class, Vec3::splat(0.5)))),
    ));
}

fn capturer_state(app: &mut App) -> CapturerState {
    let mut query = app.world_mut().query::<&SceneCapturer>();
    query.single(app.world()).unwrap().state()
}

#[test]
fn unmanaged_capturer_auto_starts_and_completes() {
    let mut app = test_app();
    let handler = SharedHandler::default();
    spawn_box(&mut app, "crate", Vec3::new(0.0, 0.0, -5.0));
    app.world_mut().spawn((
        Transform::IDENTITY,
        SceneCapturer::new("front", capture_settings(3))
            .unwrap()
            .with_data_handler(handler.clone()),
    ));

    for _ in 0..20 {
        app.update();
        if capturer_state(&mut app) == CapturerState::Completed {
            break;
        }
    }

    assert_eq!(capturer_state(&mut app), CapturerState::Completed);
    let recorded = handler.recorded.lock().unwrap();
    assert_eq!(recorded.sessions, vec![None]);
    assert_eq!(recorded.pixel_files, vec!["000000.png", "000001.png", "000002.png"]);
    assert_eq!(recorded.annotated_objects, vec![1, 1, 1]);
    assert_eq!(recorded.stops, 1);
}

#[test]
fn manager_walks_markers_in_order_then_exits() {
    let mut app = test_app();
    let handler = SharedHandler::default();
    spawn_box(&mut app, "crate", Vec3::ZERO);
    app.world_mut().spawn(SceneManager::new(SceneManagerSettings {
        auto_exit_when_captured: true,
    }));
    app.world_mut().spawn((
        SceneMarker::new("second", 1),
        Transform::from_xyz(0.0, 0.0, 8.0),
    ));
    app.world_mut().spawn((
        SceneMarker::new("first", 0),
        Transform::from_xyz(0.0, 0.0, 5.0),
    ));
    let capturer = app
        .world_mut()
        .spawn((
            Transform::from_xyz(0.0, 1.0, 0.0),
            SceneCapturer::new("orbit", capture_settings(1))
                .unwrap()
                .with_data_handler(handler.clone()),
        ))
        .id();

    for _ in 0..60 {
        app.update();
        if app.should_exit().is_some() {
            break;
        }
    }

    assert_eq!(app.should_exit(), Some(AppExit::Success));
    assert_eq!(app.world().resource::<CapturedScenes>().0, 1);

    let recorded = handler.recorded.lock().unwrap();
    assert_eq!(
        recorded.sessions,
        vec![Some("first".to_string()), Some("second".to_string())]
    );
    assert_eq!(recorded.pixel_files.len(), 2);
    assert_eq!(recorded.stops, 2);

    // The local offset is kept relative to each marker.
    let transform = app.world().get::<Transform>(capturer).unwrap();
    assert_eq!(transform.translation, Vec3::new(0.0, 1.0, 8.0));

    let mut managers = app.world_mut().query::<&SceneManager>();
    let manager = managers.single(app.world()).unwrap();
    assert_eq!(manager.state(), SceneManagerState::Captured);
}

#[test]
fn only_the_first_scene_manager_is_active() {
    let mut app = test_app();
    let first = app.world_mut().spawn(SceneManager::default()).id();
    let second = app.world_mut().spawn(SceneManager::default()).id();

    app.update();

    assert_ne!(
        app.world().get::<SceneManager>(first).unwrap().state(),
        SceneManagerState::NotActive
    );
    assert_eq!(
        app.world().get::<SceneManager>(second).unwrap().state(),
        SceneManagerState::NotActive
    );
}

#[test]
fn saturated_handler_pauses_virtual_time() {
    let mut app = test_app();
    let handler = SharedHandler::default();
    app.world_mut().spawn((
        Transform::IDENTITY,
        SceneCapturer::new("front", capture_settings(0))
            .unwrap()
            .with_data_handler(handler.clone()),
    ));

    for _ in 0..3 {
        app.update();
    }
    assert_eq!(capturer_state(&mut app), CapturerState::Running);
    assert!(!app.world().resource::<Time<Virtual>>().is_paused());

    *handler.saturated.lock().unwrap() = true;
    app.update();
    assert!(app.world().resource::<Time<Virtual>>().is_paused());
    let frames = handler.recorded.lock().unwrap().annotated_objects.len();
    app.update();
    assert_eq!(handler.recorded.lock().unwrap().annotated_objects.len(), frames);

    *handler.saturated.lock().unwrap() = false;
    app.update();
    assert!(!app.world().resource::<Time<Virtual>>().is_paused());
}

#[test]
fn launch_overrides_deactivate_unlisted_capturers() {
    let mut app = test_app();
    app.insert_resource(
        CommandLineOverrides::from_args(["-Capturers=front", "-NumberOfFrame=1"]).unwrap(),
    );
    let front = app
        .world_mut()
        .spawn((
            Transform::IDENTITY,
            SceneCapturer::new("front", capture_settings(5))
                .unwrap()
                .with_data_handler(SharedHandler::default()),
        ))
        .id();
    let side = app
        .world_mut()
        .spawn((
            Transform::IDENTITY,
            SceneCapturer::new("side", capture_settings(5))
                .unwrap()
                .with_data_handler(SharedHandler::default()),
        ))
        .id();

    for _ in 0..10 {
        app.update();
    }

    let front = app.world().get::<SceneCapturer>(front).unwrap();
    assert_eq!(front.settings().max_frames, 1);
    assert_eq!(front.state(), CapturerState::Completed);
    assert_eq!(
        app.world().get::<SceneCapturer>(side).unwrap().state(),
        CapturerState::NotActive
    );
}
