//! Depth capture sources.
//!
//! [`DepthSource`] is the seam between the capture loop and whatever
//! produces frames. [`SyntheticSource`] renders a deterministic test scene
//! so the whole pipeline runs without hardware; the Kinect itself is read
//! through V4L2 by `V4l2DepthSource` when the `v4l2` feature is enabled on
//! Linux.

use crate::depth::types::{DepthFrame, now_us};
use crate::error::StreamError;

// ── DepthSource ──────────────────────────────────────────────────

/// A producer of depth frames.
pub trait DepthSource {
    /// Block until the next frame is available.
    ///
    /// `Ok(None)` means the source has ended; errors are fatal for the
    /// capture loop.
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, StreamError>;

    /// Frame size `(width, height)`.
    fn resolution(&self) -> (u32, u32);

    /// Short human-readable description for logs.
    fn name(&self) -> String;
}

impl<S: DepthSource + ?Sized> DepthSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, StreamError> {
        (**self).next_frame()
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Width of the left band with no readings, like the Kinect's IR shadow.
const SHADOW_COLUMNS: u32 = 8;

/// Deterministic moving scene: a back wall, a floor ramp and a sphere that
/// orbits in front of the camera. Values are 11-bit Kinect disparities.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    color: bool,
    frame_number: u64,
    max_frames: Option<u64>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            color: false,
            frame_number: 0,
            max_frames: None,
        }
    }

    /// Also emit a color image (shaded by depth).
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// End the stream after `max_frames` frames.
    pub fn with_max_frames(mut self, max_frames: u64) -> Self {
        self.max_frames = Some(max_frames);
        self
    }

    /// Render frame `n` without advancing the source.
    pub fn render(&self, n: u64) -> DepthFrame {
        let (w, h) = (self.width as f32, self.height as f32);
        let phase = n as f32 * 0.05;
        let sphere_cx = w * (0.5 + 0.25 * phase.cos());
        let sphere_cy = h * (0.5 + 0.15 * phase.sin());
        let radius = h * 0.2;

        let mut depth = Vec::with_capacity((self.width * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let raw = if x < SHADOW_COLUMNS {
                    2047
                } else {
                    let (fx, fy) = (x as f32, y as f32);
                    let dx = (fx - sphere_cx) / radius;
                    let dy = (fy - sphere_cy) / radius;
                    let r2 = dx * dx + dy * dy;
                    if r2 < 1.0 {
                        // Closer at the sphere's centre.
                        (650.0 - 60.0 * (1.0 - r2).sqrt()) as u16
                    } else if fy > h * 0.75 {
                        // Floor: nearer towards the bottom of the image.
                        (1000.0 - 200.0 * (fy - h * 0.75) / (h * 0.25)) as u16
                    } else {
                        1000
                    }
                };
                depth.push(raw);
            }
        }

        let color = self.color.then(|| {
            depth
                .iter()
                .map(|&raw| {
                    if raw >= 2047 {
                        [0, 0, 0]
                    } else {
                        let shade = (1000u16.saturating_sub(raw) / 2).min(255) as u8;
                        [shade, 128, 255 - shade]
                    }
                })
                .collect()
        });

        DepthFrame {
            width: self.width,
            height: self.height,
            depth,
            color,
            frame_number: n,
            timestamp_us: now_us(),
        }
    }
}

impl DepthSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<DepthFrame>, StreamError> {
        if self.max_frames.is_some_and(|max| self.frame_number >= max) {
            return Ok(None);
        }
        let frame = self.render(self.frame_number);
        self.frame_number += 1;
        Ok(Some(frame))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn name(&self) -> String {
        format!("synthetic {}x{}", self.width, self.height)
    }
}

// ── Pixel unpacking ──────────────────────────────────────────────

/// Unpack V4L2 `Y10B`: 10-bit samples packed MSB-first, four pixels in five
/// bytes. Samples are shifted into the 11-bit disparity range so the same
/// projection applies; the all-ones sample maps to the 2047 sentinel.
pub fn unpack_y10b(data: &[u8], pixels: usize) -> Result<Vec<u16>, StreamError> {
    let needed = (pixels * 10).div_ceil(8);
    if data.len() < needed {
        return Err(StreamError::Sensor(format!(
            "Y10B buffer too short: {} < {needed}",
            data.len()
        )));
    }

    let mut out = Vec::with_capacity(pixels);
    let mut acc: u32 = 0;
    let mut bits = 0u32;
    let mut bytes = data.iter();
    while out.len() < pixels {
        while bits < 10 {
            // Length was checked above.
            let Some(&b) = bytes.next() else {
                break;
            };
            acc = (acc << 8) | b as u32;
            bits += 8;
        }
        bits -= 10;
        let sample = ((acc >> bits) & 0x3FF) as u16;
        out.push(if sample == 0x3FF { 2047 } else { sample << 1 });
    }
    Ok(out)
}

/// Unpack V4L2 `Y16 `: one little-endian `u16` per pixel.
///
/// `gspca_kinect` fills these right-aligned with the sensor's 11-bit
/// disparity, the same range [`unpack_y10b`] produces. Anything above 2047
/// cannot come from the sensor and is mapped to the 2047 sentinel.
pub fn unpack_y16(data: &[u8], pixels: usize) -> Result<Vec<u16>, StreamError> {
    if data.len() < pixels * 2 {
        return Err(StreamError::Sensor(format!(
            "Y16 buffer too short: {} < {}",
            data.len(),
            pixels * 2
        )));
    }
    Ok(data[..pixels * 2]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]).min(2047))
        .collect())
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_frames_are_sequential() {
        let mut src = SyntheticSource::new(64, 48);
        let a = src.next_frame().unwrap().unwrap();
        let b = src.next_frame().unwrap().unwrap();
        assert_eq!(a.frame_number, 0);
        assert_eq!(b.frame_number, 1);
        assert_eq!(a.depth.len(), 64 * 48);
        assert_ne!(a.depth, b.depth, "sphere should move");
    }

    #[test]
    fn synthetic_has_shadow_band() {
        let frame = SyntheticSource::new(64, 48).render(0);
        assert_eq!(frame.get(0, 10), Some(2047));
        assert_eq!(frame.get(SHADOW_COLUMNS - 1, 47), Some(2047));
        assert_ne!(frame.get(SHADOW_COLUMNS, 0), Some(2047));
    }

    #[test]
    fn synthetic_respects_frame_limit() {
        let mut src = SyntheticSource::new(8, 8).with_max_frames(2);
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().unwrap().is_some());
        assert!(src.next_frame().unwrap().is_none());
    }

    #[test]
    fn synthetic_color_matches_depth() {
        let frame = SyntheticSource::new(16, 16).with_color(true).render(3);
        assert_eq!(frame.color.as_ref().unwrap().len(), frame.depth.len());
    }

    #[test]
    fn y10b_unpacks_four_pixels_per_five_bytes() {
        // Samples 1, 2, 3, 0x3FF packed MSB-first.
        // 0000000001 0000000010 0000000011 1111111111
        let packed = [0x00, 0x40, 0x20, 0x0F, 0xFF];
        let out = unpack_y10b(&packed, 4).unwrap();
        assert_eq!(out, vec![2, 4, 6, 2047]);
    }

    #[test]
    fn y10b_short_buffer_is_error() {
        assert!(unpack_y10b(&[0u8; 4], 4).is_err());
    }

    #[test]
    fn y16_is_little_endian_eleven_bit() {
        let out = unpack_y16(&[0x34, 0x02, 0xFF, 0x07, 0x34, 0x12], 3).unwrap();
        assert_eq!(out, vec![0x0234, 2047, 2047]);
    }

    #[test]
    fn y10b_and_y16_share_a_range() {
        // Sample 300 in 10-bit packing, 600 as an 11-bit Y16 word.
        // 0100101100 0000000000 0000000000 1111111111
        let packed = [0x4B, 0x00, 0x00, 0x03, 0xFF];
        let from_y10b = unpack_y10b(&packed, 4).unwrap();
        let from_y16 = unpack_y16(&[0x58, 0x02, 0, 0, 0, 0, 0xFF, 0x07], 4).unwrap();
        assert_eq!(from_y10b, from_y16);
        assert_eq!(from_y10b, vec![600, 0, 0, 2047]);
    }
}
