/// Headless capture runner: renders the demo scene at every marker and
/// writes images and annotations to disk.
mod demo_scene;

use std::time::Duration;

use bevy::app::ScheduleRunnerPlugin;
use bevy::log::LogPlugin;
use bevy::prelude::*;
use indicatif::{ProgressBar, ProgressStyle};
use scene_capture::prelude::*;

#[derive(Resource)]
struct CaptureProgress {
    bar: ProgressBar,
    finished_frames: u64,
    sessions: u32,
    failed_sessions: u32,
}

/// Runs before the capture systems so completed capturers still hold their
/// frame count when their completion event is read.
fn report_progress(
    capturers: Query<&SceneCapturer>,
    markers: Query<(), With<SceneMarker>>,
    mut completed: EventReader<CapturerCompleted>,
    mut progress: ResMut<CaptureProgress>,
) {
    for event in completed.read() {
        if let Ok(capturer) = capturers.get(event.capturer) {
            progress.finished_frames += capturer.frame_counter().total_frame_count();
        }
        progress.sessions += 1;
        if !event.success {
            progress.failed_sessions += 1;
        }
    }

    let points = markers.iter().count().max(1) as u64;
    let total: u64 = capturers
        .iter()
        .filter(|capturer| capturer.state() != CapturerState::NotActive)
        .map(|capturer| capturer.settings().max_frames as u64 * points)
        .sum();
    if total > 0 {
        progress.bar.set_length(total);
    }

    let in_flight: u64 = capturers
        .iter()
        .filter(|capturer| capturer.is_capturing())
        .map(|capturer| capturer.frame_counter().total_frame_count())
        .sum();
    progress.bar.set_position(progress.finished_frames + in_flight);
}

fn finish_progress(mut captured: EventReader<SceneCaptured>, progress: Res<CaptureProgress>) {
    if captured.read().next().is_some() {
        progress.bar.finish_with_message("Scene captured");
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let overrides = CommandLineOverrides::from_env()?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) {msg}")?
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    bar.set_message("Capturing");

    let mut app = App::new();
    app.add_plugins(
        MinimalPlugins.set(ScheduleRunnerPlugin::run_loop(Duration::from_secs_f64(1.0 / 60.0))),
    )
    .add_plugins(LogPlugin::default())
    .add_plugins(SceneCapturePlugin::default())
    .insert_resource(overrides)
    .insert_resource(CaptureProgress {
        bar,
        finished_frames: 0,
        sessions: 0,
        failed_sessions: 0,
    })
    .add_systems(Startup, demo_scene::spawn_demo_scene)
    .add_systems(
        Update,
        (
            report_progress.before(SceneCaptureSet),
            finish_progress.after(SceneCaptureSet),
        ),
    );

    let exit = app.run();

    let world = app.world_mut();
    let mut capturers = world.query::<&SceneCapturer>();
    let output_roots: Vec<String> = capturers
        .iter(world)
        .filter(|capturer| capturer.name() == demo_scene::DEMO_CAPTURER)
        .map(|capturer| capturer.settings().output.root_directory.display().to_string())
        .collect();
    let progress = world.resource::<CaptureProgress>();
    println!(
        "Captured {} frame(s) in {} session(s), {} with failures",
        progress.finished_frames, progress.sessions, progress.failed_sessions
    );
    for root in output_roots {
        println!("Output written under {}", root);
    }

    match exit {
        AppExit::Success if progress.failed_sessions == 0 => Ok(()),
        AppExit::Success => Err("some capture sessions reported write failures".into()),
        AppExit::Error(code) => Err(format!("capture exited with code {}", code).into()),
    }
}
