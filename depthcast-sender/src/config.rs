//! Configuration for the depth sender.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use depthcast_core::{CaptureServiceConfig, Endpoint, PayloadMode, ProjectionConfig};
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// Where to stream and how to reconnect.
    pub network: NetworkConfig,
    /// Depth source settings.
    pub capture: CaptureConfig,
    /// Payload format.
    pub encoding: EncodingConfig,
    /// Depth-to-world projection (points mode).
    pub projection: ProjectionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Receiver endpoint: `HOST:PORT`, `tcp:HOST:PORT` or `unix:/path`.
    pub endpoint: Endpoint,
    /// Delay between connection attempts, in milliseconds.
    pub retry_interval_ms: u64,
    /// Give up after this many failed attempts (0 = never).
    pub max_retries: u32,
    /// Frames buffered while the receiver is slow; oldest dropped first.
    pub queue_depth: usize,
}

/// Which depth source to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Generated test scene, no hardware needed.
    Synthetic,
    /// Kinect through the Linux V4L2 driver.
    V4l2,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub source: SourceKind,
    /// V4L2 device node for the depth stream.
    pub device: String,
    pub width: u32,
    pub height: u32,
    /// Target frames per second (0 = as fast as the source delivers).
    pub fps: u32,
    /// Ask the synthetic source for a color image too.
    pub color: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// `points` sends projected XYZ, `depth` sends the raw map.
    pub payload: PayloadMode,
    pub compress: bool,
    /// zstd level (1..=19).
    pub compression_level: i32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
    /// Seconds between throughput reports (0 = off).
    pub stats_interval_secs: u64,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            retry_interval_ms: 1000,
            max_retries: 0,
            queue_depth: 2,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            device: "/dev/video1".into(),
            width: 640,
            height: 480,
            fps: 30,
            color: false,
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            payload: PayloadMode::Points,
            compress: true,
            compression_level: 3,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
            stats_interval_secs: 5,
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

/// Why [`SenderConfig::load`] fell back to defaults.
#[derive(Debug)]
pub enum ConfigFallback {
    Missing(PathBuf),
    Invalid { path: PathBuf, error: toml::de::Error },
}

impl ConfigFallback {
    /// Report through `tracing`; call once a subscriber is installed.
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
                write!(f, "invalid config {}: {error}; using defaults", path.display())
            }
        }
    }
}

impl SenderConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    ///
    /// Runs before logging is set up, so the fallback is returned rather
    /// than logged.
    pub fn load(path: &Path) -> (Self, Option<ConfigFallback>) {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(_) => return (Self::default(), Some(ConfigFallback::Missing(path.into()))),
        };
        match Self::parse(&contents) {
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

    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Convert into the service's runtime configuration.
    pub fn to_service_config(&self) -> CaptureServiceConfig {
        CaptureServiceConfig {
            endpoint: self.network.endpoint.clone(),
            target_fps: self.capture.fps.min(120),
            queue_depth: self.network.queue_depth.max(1),
            retry_interval: Duration::from_millis(self.network.retry_interval_ms.max(10)),
            max_retries: self.network.max_retries,
            payload: self.encoding.payload,
            compress: self.encoding.compress,
            compression_level: self.encoding.compression_level.clamp(1, 19),
            projection: self.projection,
            stats_interval: Duration::from_secs(self.logging.stats_interval_secs),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&SenderConfig::default()).unwrap();
        assert!(text.contains("endpoint = \"127.0.0.1:7340\""));
        assert!(text.contains("source = \"synthetic\""));
        assert!(text.contains("units = \"raw11\""));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&SenderConfig::default()).unwrap();
        let parsed = SenderConfig::parse(&text).unwrap();
        assert_eq!(parsed.network.endpoint, Endpoint::default());
        assert_eq!(parsed.network.queue_depth, 2);
        assert_eq!(parsed.capture.fps, 30);
        assert_eq!(parsed.projection, ProjectionConfig::default());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let parsed = SenderConfig::parse(
            r#"
            [network]
            endpoint = "unix:/tmp/kinect.sock"

            [encoding]
            payload = "depth"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.network.endpoint, Endpoint::Unix("/tmp/kinect.sock".into()));
        assert_eq!(parsed.network.retry_interval_ms, 1000);
        assert_eq!(parsed.encoding.payload, PayloadMode::Depth);
        assert!(parsed.encoding.compress);
    }

    #[test]
    fn bad_endpoint_is_rejected() {
        assert!(SenderConfig::parse("[network]\nendpoint = \"nowhere\"").is_err());
    }

    #[test]
    fn to_service_config_clamps() {
        let mut cfg = SenderConfig::default();
        cfg.network.queue_depth = 0;
        cfg.encoding.compression_level = 40;
        cfg.network.retry_interval_ms = 0;
        let svc = cfg.to_service_config();
        assert_eq!(svc.queue_depth, 1);
        assert_eq!(svc.compression_level, 19);
        assert_eq!(svc.retry_interval, Duration::from_millis(10));
    }

    #[test]
    fn missing_file_uses_defaults() {
        let (cfg, fallback) = SenderConfig::load(Path::new("/nonexistent/depthcast-sender.toml"));
        assert_eq!(cfg.capture.source, SourceKind::Synthetic);
        assert!(matches!(fallback, Some(ConfigFallback::Missing(_))));
    }

    #[test]
    fn malformed_file_is_reported() {
        let path = std::env::temp_dir().join(format!(
            "depthcast-sender-malformed-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[network]\nqueue_depth = \"two\"\n").unwrap();

        let (cfg, fallback) = SenderConfig::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg.network.queue_depth, 2);
        let fallback = fallback.expect("malformed file must be reported");
        assert!(matches!(fallback, ConfigFallback::Invalid { .. }));
        let message = fallback.to_string();
        assert!(message.starts_with("invalid config "));
        assert!(message.contains("queue_depth"));
    }

    #[test]
    fn valid_file_loads_without_fallback() {
        let path = std::env::temp_dir().join(format!(
            "depthcast-sender-valid-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[capture]\nfps = 15\n").unwrap();

        let (cfg, fallback) = SenderConfig::load(&path);
        std::fs::remove_file(&path).unwrap();

        assert!(fallback.is_none());
        assert_eq!(cfg.capture.fps, 15);
    }
}
