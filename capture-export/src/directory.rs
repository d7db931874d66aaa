use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bevy::log::info;
use scene_capture::config::DirectoryConflictPolicy;

/// Create the session directory according to `policy` and return the
/// directory actually used.
pub fn prepare_session_directory(
    requested: &Path,
    policy: DirectoryConflictPolicy,
) -> io::Result<PathBuf> {
    match policy {
        DirectoryConflictPolicy::OverwriteExistingFiles => {
            fs::create_dir_all(requested)?;
            Ok(requested.to_path_buf())
        }
        DirectoryConflictPolicy::CleanDirectory => {
            if requested.exists() {
                info!("Cleaning {}", requested.display());
                fs::remove_dir_all(requested)?;
            }
            fs::create_dir_all(requested)?;
            Ok(requested.to_path_buf())
        }
        DirectoryConflictPolicy::CreateNewDirectoryWithTimestampPostfix => {
            if !requested.exists() {
                fs::create_dir_all(requested)?;
                return Ok(requested.to_path_buf());
            }

            let seconds = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or_default();
            let directory = timestamped_sibling(requested, seconds);
            fs::create_dir_all(&directory)?;
            info!("{} exists, writing to {}", requested.display(), directory.display());
            Ok(directory)
        }
    }
}

/// `<name>_<seconds>`, then `<name>_<seconds>_<n>` until unused.
fn timestamped_sibling(requested: &Path, seconds: u64) -> PathBuf {
    let name = requested
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture".to_string());
    let base = format!("{}_{}", name, seconds);

    let mut candidate = requested.with_file_name(&base);
    let mut suffix = 1;
    while candidate.exists() {
        candidate = requested.with_file_name(format!("{}_{}", base, suffix));
        suffix += 1;
    }
    candidate
}
