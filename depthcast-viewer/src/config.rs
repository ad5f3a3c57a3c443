//! Viewer configuration.

use std::fmt;
use std::path::{Path, PathBuf};

use depthcast_core::{Endpoint, ProjectionConfig};
use serde::{Deserialize, Serialize};

use crate::scene::{DisplaySettings, ViewMode};

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Initial panel values.
    pub display: DisplayConfig,
    /// Used to project raw depth-map payloads.
    pub projection: ProjectionConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Where the depth server listens when started.
    pub listen: Endpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Keep every n-th point (1..=64).
    pub drop_points: u32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub scale_z: f32,
    /// Start the server as soon as the viewer opens.
    pub autostart: bool,
    /// Lines kept in the panel's log list.
    pub log_capacity: usize,
    pub view: ViewMode,
    /// Directory for PLY exports.
    pub export_dir: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Log file path. The terminal belongs to the UI, so tracing output is
    /// discarded when this is empty.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: Endpoint::default(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        let settings = DisplaySettings::default();
        Self {
            drop_points: settings.drop_points(),
            scale_x: settings.scale()[0],
            scale_y: settings.scale()[1],
            scale_z: settings.scale()[2],
            autostart: false,
            log_capacity: 10,
            view: ViewMode::Front,
            export_dir: PathBuf::from("."),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Why [`ViewerConfig::load`] fell back to defaults.
#[derive(Debug)]
pub enum ConfigFallback {
    Missing(PathBuf),
    Invalid { path: PathBuf, error: toml::de::Error },
}

impl ConfigFallback {
    pub fn is_invalid(&self) -> bool {
        matches!(self, ConfigFallback::Invalid { .. })
    }

    pub fn log(&self) {
        match self {
            ConfigFallback::Missing(_) => tracing::info!("{self}"),
            ConfigFallback::Invalid { .. } => tracing::warn!("{self}"),
        }
    }
}

impl fmt::Display for ConfigFallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFallback::Missing(path) => {
                write!(f, "no config at {}; using defaults", path.display())
            }
            ConfigFallback::Invalid { path, error } => {
                // toml errors span several lines; the panel shows one.
                let first = error.message().lines().next().unwrap_or_default();
                write!(f, "invalid config {}: {first}; using defaults", path.display())
            }
        }
    }
}

impl ViewerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Nothing is logged here: tracing is not set up yet when this runs.
    pub fn load(path: &Path) -> (Self, Option<ConfigFallback>) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return (Self::default(), Some(ConfigFallback::Missing(path.into()))),
        };
        match toml::from_str(&contents) {
            Ok(config) => (config, None),
            Err(error) => (
                Self::default(),
                Some(ConfigFallback::Invalid {
                    path: path.into(),
                    error,
                }),
            ),
        }
    }

    /// Panel settings, clamped to their allowed ranges.
    pub fn display_settings(&self) -> DisplaySettings {
        let d = &self.display;
        DisplaySettings::new(d.drop_points, [d.scale_x, d.scale_y, d.scale_z])
    }
}

// ── Tests ────────────────────────────────────────────────────────
