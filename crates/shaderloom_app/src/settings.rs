// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session settings.
//!
//! Stored as RON next to a project or passed with `--settings`:
//! - render size used for `iResolution`
//! - headless frame count and clock step
//! - sampling applied to links made through the session
//! - log filter and keyboard input

use serde::{Deserialize, Serialize};
use shaderloom_graph::{Filter, Wrap};
use std::path::Path;

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Default settings file name
pub const SETTINGS_FILE_NAME: &str = "shaderloom.ron";

/// Clock behaviour for rendered frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum TimeStep {
    /// Wall clock time
    #[default]
    Realtime,
    /// Advance by a fixed number of seconds per frame
    Fixed(f32),
}

/// Sampling applied to new links
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LinkDefaults {
    /// Texture filter
    pub filter: Filter,
    /// Texture wrap mode
    pub wrap: Wrap,
}

/// Complete session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Settings format version
    pub version: u32,
    /// Render size in pixels
    pub render_size: [u32; 2],
    /// Frames rendered by a headless run
    #[serde(default)]
    pub frames: u32,
    /// Clock behaviour
    #[serde(default)]
    pub time_step: TimeStep,
    /// Sampling for links made through the session
    #[serde(default)]
    pub link_defaults: LinkDefaults,
    /// Log filter directives, overridden by `RUST_LOG`
    #[serde(default)]
    pub log_filter: Option<String>,
    /// Feed key events into keyboard textures
    #[serde(default = "default_true")]
    pub keyboard_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            render_size: [1280, 720],
            frames: 0,
            time_step: TimeStep::Realtime,
            link_defaults: LinkDefaults::default(),
            log_filter: None,
            keyboard_enabled: true,
        }
    }
}

impl SessionSettings {
    /// Load settings from a file
    pub fn load(path: &Path) -> std::io::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: SessionSettings = ron::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "Settings version {} is newer than supported version {}",
                    settings.version, SETTINGS_FORMAT_VERSION
                ),
            ));
        }

        Ok(settings)
    }

    /// Load settings from `path` when given, otherwise the defaults
    pub fn load_or_default(path: Option<&Path>) -> std::io::Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let config = ron::ser::PrettyConfig::default()
            .struct_names(true)
            .enumerate_arrays(false);

        let content = ron::ser::to_string_pretty(self, config).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;

        std::fs::write(path, content)
    }

    /// `iResolution` for the render size
    pub fn resolution(&self) -> [f32; 3] {
        [self.render_size[0] as f32, self.render_size[1] as f32, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = SessionSettings::default();
        assert_eq!(settings.version, SETTINGS_FORMAT_VERSION);
        assert_eq!(settings.link_defaults.filter, Filter::Linear);
        assert_eq!(settings.link_defaults.wrap, Wrap::Repeat);
        assert_eq!(settings.resolution(), [1280.0, 720.0, 1.0]);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);

        let settings = SessionSettings {
            render_size: [640, 360],
            frames: 12,
            time_step: TimeStep::Fixed(0.5),
            link_defaults: LinkDefaults {
                filter: Filter::Nearest,
                wrap: Wrap::Clamp,
            },
            log_filter: Some("shaderloom_graph=debug".to_string()),
            ..SessionSettings::default()
        };
        settings.save(&path).unwrap();

        assert_eq!(SessionSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let loaded: SessionSettings =
            ron::from_str("SessionSettings(version: 1, render_size: (320, 200))").unwrap();
        assert_eq!(loaded.frames, 0);
        assert_eq!(loaded.time_step, TimeStep::Realtime);
        assert!(loaded.keyboard_enabled);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE_NAME);
        let settings = SessionSettings {
            version: SETTINGS_FORMAT_VERSION + 1,
            ..SessionSettings::default()
        };
        settings.save(&path).unwrap();

        let err = SessionSettings::load(&path).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }
}
