//! Shared frame types for the capture pipeline.
//!
//! [`DepthFrame`] is the **internal** representation handed from a
//! [`DepthSource`](crate::depth::capture::DepthSource) to the projector and
//! encoder. It is distinct from [`Packet`](crate::packet::Packet), which is
//! the serialisable *wire* type.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StreamError;

// ── DepthFrame ───────────────────────────────────────────────────

/// One depth capture, optionally with a registered color image.
///
/// `depth` holds `height` rows of `width` values in sensor units
/// (see [`DepthUnits`](crate::depth::projection::DepthUnits)).
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row-major depth values, `width * height` entries.
    pub depth: Vec<u16>,
    /// Optional per-pixel RGB, same length as `depth`.
    pub color: Option<Vec<[u8; 3]>>,
    /// Sequential frame counter assigned by the source.
    pub frame_number: u64,
    /// Capture time in microseconds since the UNIX epoch.
    pub timestamp_us: u64,
}

impl DepthFrame {
    /// Wrap a depth buffer, checking it matches the dimensions.
    pub fn new(width: u32, height: u32, depth: Vec<u16>) -> Result<Self, StreamError> {
        let expected = width as usize * height as usize;
        if depth.len() != expected {
            return Err(StreamError::InvalidPayload(format!(
                "depth buffer has {} values, {width}x{height} needs {expected}",
                depth.len()
            )));
        }
        Ok(Self {
            width,
            height,
            depth,
            color: None,
            frame_number: 0,
            timestamp_us: now_us(),
        })
    }

    /// Attach a color image of the same size.
    pub fn with_color(mut self, color: Vec<[u8; 3]>) -> Result<Self, StreamError> {
        if color.len() != self.depth.len() {
            return Err(StreamError::InvalidPayload(format!(
                "color buffer has {} pixels, depth has {}",
                color.len(),
                self.depth.len()
            )));
        }
        self.color = Some(color);
        Ok(self)
    }

    pub fn with_frame_number(mut self, frame_number: u64) -> Self {
        self.frame_number = frame_number;
        self
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.depth.len()
    }

    /// Depth value at `(x, y)`, or `None` when out of bounds.
    pub fn get(&self, x: u32, y: u32) -> Option<u16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.depth
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }
}

/// Current wall-clock time in microseconds since the UNIX epoch.
pub fn now_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}
