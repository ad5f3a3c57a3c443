//! Opens the configured depth source.

use depthcast_core::{DepthSource, StreamError, SyntheticSource};
use tracing::info;

use crate::config::{CaptureConfig, SourceKind};

/// A depth source that can be moved onto the capture thread.
pub type BoxedSource = Box<dyn DepthSource + Send>;

/// Open the source described by `config`.
///
/// A missing or busy sensor is [`StreamError::SensorUnavailable`].
pub fn open_source(config: &CaptureConfig) -> Result<BoxedSource, StreamError> {
    match config.source {
        SourceKind::Synthetic => {
            info!("using synthetic depth source");
            Ok(Box::new(
                SyntheticSource::new(config.width, config.height).with_color(config.color),
            ))
        }
        SourceKind::V4l2 => open_v4l2(config),
    }
}

#[cfg(all(feature = "v4l2", target_os = "linux"))]
fn open_v4l2(config: &CaptureConfig) -> Result<BoxedSource, StreamError> {
    let source =
        depthcast_core::V4l2DepthSource::open(&config.device, config.width, config.height)?;
    Ok(Box::new(source))
}

#[cfg(not(all(feature = "v4l2", target_os = "linux")))]
fn open_v4l2(config: &CaptureConfig) -> Result<BoxedSource, StreamError> {
    Err(StreamError::SensorUnavailable(format!(
        "{}: built without V4L2 support (enable the `v4l2` feature on Linux)",
        config.device
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_uses_configured_size() {
        let config = CaptureConfig {
            width: 80,
            height: 60,
            ..CaptureConfig::default()
        };
        let mut source = open_source(&config).unwrap();
        assert_eq!(source.resolution(), (80, 60));
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.depth.len(), 80 * 60);
    }

    #[test]
    fn missing_device_is_unavailable() {
        let config = CaptureConfig {
            source: SourceKind::V4l2,
            device: "/dev/depthcast-does-not-exist".into(),
            ..CaptureConfig::default()
        };
        assert!(matches!(
            open_source(&config),
            Err(StreamError::SensorUnavailable(_))
        ));
    }
}
