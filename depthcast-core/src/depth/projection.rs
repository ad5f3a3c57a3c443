//! Depth-to-world projection.
//!
//! Converts a [`DepthFrame`] into a [`PointCloud`] with a pinhole model.
//! Raw Kinect values are 11-bit disparities; they are turned into metres
//! with the usual empirical fit
//!
//! ```text
//! z = 1 / (raw * -0.0030711016 + 3.3309495161)
//! ```
//!
//! and back-projected as `x = (u - cx) * z / fx`, `y = (cy - v) * z / fy`.
//!
//! ## No-reading pixels
//!
//! Raw `0` and anything `>= invalid_raw` mean the sensor saw nothing. The
//! threshold defaults per unit: 2047 for Kinect disparities, `u16::MAX`
//! for millimetres. Such pixels produce no point, as do disparities
//! whose fit has a non-positive denominator. An all-zero frame therefore
//! projects to an empty cloud.

use serde::{Deserialize, Serialize};

use crate::depth::pointcloud::PointCloud;
use crate::depth::types::DepthFrame;

const DISPARITY_SCALE: f32 = -0.003_071_101_6;
const DISPARITY_OFFSET: f32 = 3.330_949_516_1;

/// Resolution the default intrinsics were calibrated at.
const REFERENCE_WIDTH: f32 = 640.0;
const REFERENCE_HEIGHT: f32 = 480.0;

// ── Config ───────────────────────────────────────────────────────

/// Unit of the values in [`DepthFrame::depth`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthUnits {
    /// Kinect v1 11-bit disparity.
    Raw11,
    /// Metric depth in millimetres.
    Millimeters,
}

impl DepthUnits {
    /// First "no reading" value when none is configured.
    pub fn default_invalid_raw(self) -> u16 {
        match self {
            DepthUnits::Raw11 => 2047,
            DepthUnits::Millimeters => u16::MAX,
        }
    }
}

/// Pinhole intrinsics at 640×480; scaled to the actual frame size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
}

impl Default for Intrinsics {
    /// Kinect v1 depth camera.
    fn default() -> Self {
        Self {
            fx: 594.21,
            fy: 591.04,
            cx: 339.31,
            cy: 242.74,
        }
    }
}

/// Projection settings shared by sender and receiver.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub units: DepthUnits,
    pub intrinsics: Intrinsics,
    /// First raw value treated as "no reading"; unset uses
    /// [`DepthUnits::default_invalid_raw`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_raw: Option<u16>,
    /// Keep every n-th valid point (1 keeps all).
    pub decimation: u32,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            units: DepthUnits::Raw11,
            intrinsics: Intrinsics::default(),
            invalid_raw: None,
            decimation: 1,
        }
    }
}

impl ProjectionConfig {
    /// Effective "no reading" threshold.
    pub fn invalid_threshold(&self) -> u16 {
        self.invalid_raw
            .unwrap_or_else(|| self.units.default_invalid_raw())
    }
}

// ── Projector ────────────────────────────────────────────────────

/// Stateless-per-frame projector with a precomputed depth lookup table.
#[derive(Debug, Clone)]
pub struct Projector {
    config: ProjectionConfig,
    /// Metres per raw value; `0.0` marks a no-reading value.
    depth_lut: Vec<f32>,
}

impl Projector {
    pub fn new(config: ProjectionConfig) -> Self {
        let depth_lut = (0..config.invalid_threshold())
            .map(|raw| raw_to_meters(raw, &config).unwrap_or(0.0))
            .collect();
        Self { config, depth_lut }
    }

    pub fn config(&self) -> &ProjectionConfig {
        &self.config
    }

    /// Depth in metres for one raw value, or `None` for no reading.
    #[inline]
    pub fn depth_meters(&self, raw: u16) -> Option<f32> {
        match self.depth_lut.get(raw as usize) {
            Some(&z) if z > 0.0 => Some(z),
            _ => None,
        }
    }

    /// Back-project every valid pixel of `frame`.
    pub fn project(&self, frame: &DepthFrame) -> PointCloud {
        let Intrinsics { fx, fy, cx, cy } = self.scaled_intrinsics(frame.width, frame.height);
        let step = self.config.decimation.max(1) as usize;
        let width = frame.width as usize;

        let mut points = Vec::with_capacity(frame.pixel_count() / step);
        let mut colors = frame
            .color
            .as_ref()
            .map(|_| Vec::with_capacity(frame.pixel_count() / step));
        let mut valid_seen = 0usize;

        for (idx, &raw) in frame.depth.iter().enumerate() {
            let Some(z) = self.depth_meters(raw) else {
                continue;
            };
            let keep = valid_seen % step == 0;
            valid_seen += 1;
            if !keep {
                continue;
            }

            let u = (idx % width) as f32;
            let v = (idx / width) as f32;
            points.push([(u - cx) * z / fx, (cy - v) * z / fy, z]);

            if let (Some(out), Some(src)) = (colors.as_mut(), frame.color.as_ref()) {
                out.push(src[idx]);
            }
        }

        match colors {
            Some(colors) => PointCloud::with_colors(points, colors).unwrap_or_default(),
            None => PointCloud::new(points),
        }
    }

    fn scaled_intrinsics(&self, width: u32, height: u32) -> Intrinsics {
        let base = self.config.intrinsics;
        let sx = width as f32 / REFERENCE_WIDTH;
        let sy = height as f32 / REFERENCE_HEIGHT;
        Intrinsics {
            fx: base.fx * sx,
            fy: base.fy * sy,
            cx: base.cx * sx,
            cy: base.cy * sy,
        }
    }
}

impl Default for Projector {
    fn default() -> Self {
        Self::new(ProjectionConfig::default())
    }
}

fn raw_to_meters(raw: u16, config: &ProjectionConfig) -> Option<f32> {
    if raw == 0 || raw >= config.invalid_threshold() {
        return None;
    }
    match config.units {
        DepthUnits::Raw11 => {
            let denom = raw as f32 * DISPARITY_SCALE + DISPARITY_OFFSET;
            (denom > 0.0).then(|| 1.0 / denom)
        }
        DepthUnits::Millimeters => Some(raw as f32 / 1000.0),
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32, fill: u16) -> DepthFrame {
        DepthFrame::new(width, height, vec![fill; (width * height) as usize]).unwrap()
    }

    #[test]
    fn all_zero_frame_is_empty() {
        let cloud = Projector::default().project(&frame(64, 48, 0));
        assert!(cloud.is_empty());
    }

    #[test]
    fn sentinel_pixels_are_skipped() {
        let mut f = frame(4, 1, 700);
        f.depth[1] = 2047;
        f.depth[2] = 0;
        let cloud = Projector::default().project(&f);
        assert_eq!(cloud.len(), 2);
    }

    #[test]
    fn far_disparity_without_positive_depth_is_skipped() {
        // 3.33 / 0.00307 ≈ 1084.6: beyond that the fit goes negative.
        let projector = Projector::default();
        assert!(projector.depth_meters(1080).is_some());
        assert!(projector.depth_meters(1090).is_none());
    }

    #[test]
    fn raw_depth_matches_fit() {
        let z = Projector::default().depth_meters(800).unwrap();
        let expected = 1.0 / (800.0 * -0.0030711016 + 3.3309495161);
        assert!((z - expected).abs() < 1e-4, "z = {z}");
    }

    #[test]
    fn millimeters_are_scaled() {
        let projector = Projector::new(ProjectionConfig {
            units: DepthUnits::Millimeters,
            ..ProjectionConfig::default()
        });
        assert_eq!(projector.depth_meters(1500), Some(1.5));
        assert_eq!(projector.depth_meters(0), None);
    }

    #[test]
    fn millimeters_reach_past_eleven_bits() {
        let projector = Projector::new(ProjectionConfig {
            units: DepthUnits::Millimeters,
            ..ProjectionConfig::default()
        });
        assert_eq!(projector.depth_meters(2047), Some(2.047));
        assert_eq!(projector.depth_meters(4500), Some(4.5));
        assert_eq!(projector.depth_meters(u16::MAX), None);
    }

    #[test]
    fn explicit_threshold_overrides_unit_default() {
        let projector = Projector::new(ProjectionConfig {
            units: DepthUnits::Millimeters,
            invalid_raw: Some(4000),
            ..ProjectionConfig::default()
        });
        assert_eq!(projector.depth_meters(3999), Some(3.999));
        assert_eq!(projector.depth_meters(4000), None);
    }

    #[test]
    fn principal_point_projects_to_axis() {
        let config = ProjectionConfig {
            intrinsics: Intrinsics {
                fx: 500.0,
                fy: 500.0,
                cx: 2.0,
                cy: 1.0,
            },
            ..ProjectionConfig::default()
        };
        // Intrinsics are given at 640x480; use that size so no scaling applies.
        let mut f = frame(640, 480, 0);
        f.depth[640 + 2] = 700; // (u=2, v=1)
        let cloud = Projector::new(config).project(&f);
        assert_eq!(cloud.len(), 1);
        let [x, y, z] = cloud.points()[0];
        assert!(x.abs() < 1e-6);
        assert!(y.abs() < 1e-6);
        assert!(z > 0.0);
    }

    #[test]
    fn image_up_is_world_up() {
        let mut f = frame(640, 480, 0);
        f.depth[320] = 700; // top row
        f.depth[479 * 640 + 320] = 700; // bottom row
        let cloud = Projector::default().project(&f);
        let top = cloud.points()[0];
        let bottom = cloud.points()[1];
        assert!(top[1] > 0.0);
        assert!(bottom[1] < 0.0);
    }

    #[test]
    fn decimation_keeps_every_nth_valid_point() {
        let projector = Projector::new(ProjectionConfig {
            decimation: 3,
            ..ProjectionConfig::default()
        });
        // 10 valid points -> indices 0, 3, 6, 9 kept.
        let cloud = projector.project(&frame(10, 1, 600));
        assert_eq!(cloud.len(), 4);
    }

    #[test]
    fn projection_is_deterministic() {
        let mut f = frame(32, 24, 0);
        for (i, d) in f.depth.iter_mut().enumerate() {
            *d = if i % 7 == 0 { 2047 } else { 500 + (i % 400) as u16 };
        }
        let projector = Projector::default();
        let a = projector.project(&f);
        let b = projector.project(&f);
        assert_eq!(a, b);
        assert_eq!(a.len(), f.depth.iter().filter(|&&d| d != 2047).count());
    }

    #[test]
    fn colors_follow_kept_points() {
        let mut f = frame(3, 1, 600)
            .with_color(vec![[1, 0, 0], [0, 2, 0], [0, 0, 3]])
            .unwrap();
        f.depth[1] = 2047;
        let cloud = Projector::default().project(&f);
        assert_eq!(cloud.colors().unwrap(), &[[1, 0, 0], [0, 0, 3]]);
    }
}
