// Standard library and external crates
use std::path::PathBuf;

use bevy::log::info;
use bevy::prelude::Resource;

// Crate modules
use super::CapturerSettings;
use crate::error::CaptureError;

/// Launch arguments that patch capturer settings, e.g.
/// `-OutputPath=/data -NumberOfFrame=100 -SettingsPath=cfg.json -Capturers=front,top`.
/// Keys are case-insensitive; unknown arguments are ignored.
#[derive(Resource, Debug, Clone, Default, PartialEq)]
pub struct CommandLineOverrides {
    pub output_path: Option<PathBuf>,
    pub number_of_frames: Option<u32>,
    pub settings_path: Option<PathBuf>,
    /// Only these capturers stay active when set.
    pub capturers: Option<Vec<String>>,
}

impl CommandLineOverrides {
    pub fn from_env() -> Result<Self, CaptureError> {
        Self::from_args(std::env::args().skip(1))
    }

    pub fn from_args<I, S>(args: I) -> Result<Self, CaptureError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut overrides = Self::default();
        for arg in args {
            let Some((key, value)) = arg.as_ref().trim_start_matches('-').split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"');

            match key.to_ascii_lowercase().as_str() {
                "outputpath" => overrides.output_path = Some(PathBuf::from(value)),
                "numberofframe" => {
                    let frames = value.parse().map_err(|_| {
                        CaptureError::InvalidArgument(format!(
                            "NumberOfFrame expects a non-negative integer, got `{}`",
                            value
                        ))
                    })?;
                    overrides.number_of_frames = Some(frames);
                }
                "settingspath" => overrides.settings_path = Some(PathBuf::from(value)),
                "capturers" => {
                    overrides.capturers = Some(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|name| !name.is_empty())
                            .map(str::to_string)
                            .collect(),
                    )
                }
                _ => {}
            }
        }
        Ok(overrides)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply to the settings of capturer `name`: settings file first, then
    /// the individual values, then the capturer filter.
    pub fn apply(&self, name: &str, settings: &CapturerSettings) -> Result<CapturerSettings, CaptureError> {
        let mut settings = match &self.settings_path {
            Some(path) => settings.merged_with_file(path)?,
            None => settings.clone(),
        };

        if let Some(path) = &self.output_path {
            settings.output.root_directory = path.clone();
        }
        if let Some(frames) = self.number_of_frames {
            settings.max_frames = frames;
        }
        if let Some(capturers) = &self.capturers {
            let selected = capturers
                .iter()
                .any(|capturer| capturer.eq_ignore_ascii_case(name));
            if !selected && settings.active {
                info!("Capturer `{}` not listed in -Capturers, deactivated", name);
                settings.active = false;
            }
        }

        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn keys_are_case_insensitive() {
        let overrides = CommandLineOverrides::from_args([
            "-outputpath=/tmp/out",
            "-NUMBEROFFRAME=25",
            "--Capturers=front, top",
            "positional",
            "-Unknown=1",
        ])
        .unwrap();

        assert_eq!(overrides.output_path, Some(PathBuf::from("/tmp/out")));
        assert_eq!(overrides.number_of_frames, Some(25));
        assert_eq!(
            overrides.capturers,
            Some(vec!["front".to_string(), "top".to_string()])
        );
    }

    #[test]
    fn bad_frame_count_is_rejected() {
        assert!(CommandLineOverrides::from_args(["-NumberOfFrame=many"]).is_err());
    }

    #[test]
    fn explicit_values_win_over_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "max_frames": 3, "capture_interval_secs": 0.5 }"#).unwrap();

        let overrides = CommandLineOverrides {
            number_of_frames: Some(9),
            settings_path: Some(path),
            capturers: Some(vec!["Other".to_string()]),
            ..Default::default()
        };
        let settings = overrides
            .apply("main", &CapturerSettings::default())
            .unwrap();

        assert_eq!(settings.max_frames, 9);
        assert_eq!(settings.capture_interval_secs, 0.5);
        assert!(!settings.active);
    }
}
