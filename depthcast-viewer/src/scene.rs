//! The scene's point-cloud object and the panel settings that shape it.
//!
//! [`SceneCloud`] is updated in place from each received cloud: every
//! n-th point is kept and each axis is scaled, so panel changes apply to
//! the next update (or immediately via [`SceneCloud::rebuild`]).

use std::io::{self, Write};
use std::ops::RangeInclusive;
use std::path::Path;

use depthcast_core::PointCloud;
use serde::{Deserialize, Serialize};

/// Name of the point-cloud object, used in titles and exports.
pub const OBJECT_NAME: &str = "KinectPointCloud";

pub const DROP_RANGE: RangeInclusive<u32> = 1..=64;
pub const SCALE_RANGE: RangeInclusive<f32> = 0.1..=4.0;
pub const SCALE_STEP: f32 = 0.1;

// ── DisplaySettings ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

/// "Drop points" and per-axis scale, always within their ranges.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplaySettings {
    drop_points: u32,
    scale: [f32; 3],
}

impl DisplaySettings {
    pub fn new(drop_points: u32, scale: [f32; 3]) -> Self {
        let mut settings = Self::default();
        settings.set_drop_points(drop_points);
        for (axis, value) in [Axis::X, Axis::Y, Axis::Z].into_iter().zip(scale) {
            settings.set_scale(axis, value);
        }
        settings
    }

    pub fn drop_points(&self) -> u32 {
        self.drop_points
    }

    pub fn scale(&self) -> [f32; 3] {
        self.scale
    }

    pub fn set_drop_points(&mut self, n: u32) {
        self.drop_points = n.clamp(*DROP_RANGE.start(), *DROP_RANGE.end());
    }

    pub fn adjust_drop_points(&mut self, delta: i32) {
        self.set_drop_points(self.drop_points.saturating_add_signed(delta));
    }

    pub fn set_scale(&mut self, axis: Axis, value: f32) {
        let value = if value.is_finite() { value } else { 1.0 };
        self.scale[axis.index()] = value.clamp(*SCALE_RANGE.start(), *SCALE_RANGE.end());
    }

    /// Step `axis` up or down by [`SCALE_STEP`], rounded to one decimal.
    pub fn step_scale(&mut self, axis: Axis, up: bool) {
        let current = self.scale[axis.index()];
        let next = if up { current + SCALE_STEP } else { current - SCALE_STEP };
        self.set_scale(axis, (next * 10.0).round() / 10.0);
    }
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            drop_points: 1,
            scale: [0.5, 0.5, 1.0],
        }
    }
}

// ── ViewMode ─────────────────────────────────────────────────────

/// Which plane the viewport shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// Looking down the sensor axis: x right, y up.
    #[default]
    Front,
    /// From above: x right, depth up.
    Top,
}

impl ViewMode {
    pub fn toggle(self) -> Self {
        match self {
            ViewMode::Front => ViewMode::Top,
            ViewMode::Top => ViewMode::Front,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewMode::Front => "Front",
            ViewMode::Top => "Top",
        }
    }

    /// 2D coordinates of `p` in this view.
    pub fn project(self, p: [f32; 3]) -> (f64, f64) {
        match self {
            ViewMode::Front => (p[0] as f64, p[1] as f64),
            ViewMode::Top => (p[0] as f64, p[2] as f64),
        }
    }
}

// ── SceneCloud ───────────────────────────────────────────────────

/// The scene's point-cloud object.
#[derive(Debug, Clone, Default)]
pub struct SceneCloud {
    points: Vec<[f32; 3]>,
    colors: Option<Vec<[u8; 3]>>,
    frame_number: Option<u64>,
}

impl SceneCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the contents with `cloud`, thinned and scaled by `settings`.
    /// Buffers are reused between frames.
    pub fn update(&mut self, cloud: &PointCloud, frame_number: u64, settings: &DisplaySettings) {
        let step = settings.drop_points() as usize;
        let [sx, sy, sz] = settings.scale();

        self.points.clear();
        self.points.extend(
            cloud
                .points()
                .iter()
                .step_by(step)
                .map(|&[x, y, z]| [x * sx, y * sy, z * sz]),
        );

        match cloud.colors() {
            Some(src) => {
                let colors = self.colors.get_or_insert_with(Vec::new);
                colors.clear();
                colors.extend(src.iter().step_by(step).copied());
            }
            None => self.colors = None,
        }
        self.frame_number = Some(frame_number);
    }

    /// Reapply `settings` to `cloud` without counting a new frame.
    pub fn rebuild(&mut self, cloud: &PointCloud, settings: &DisplaySettings) {
        let frame_number = self.frame_number.unwrap_or_default();
        self.update(cloud, frame_number, settings);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f32; 3]] {
        &self.points
    }

    pub fn colors(&self) -> Option<&[[u8; 3]]> {
        self.colors.as_deref()
    }

    /// Frame the object was last updated from.
    pub fn frame_number(&self) -> Option<u64> {
        self.frame_number
    }

    /// Bounds of the points in `view`: `([x_min, x_max], [y_min, y_max])`.
    pub fn view_bounds(&self, view: ViewMode) -> Option<([f64; 2], [f64; 2])> {
        let mut iter = self.points.iter().map(|&p| view.project(p));
        let (x0, y0) = iter.next()?;
        let (mut xs, mut ys) = ([x0, x0], [y0, y0]);
        for (x, y) in iter {
            xs = [xs[0].min(x), xs[1].max(x)];
            ys = [ys[0].min(y), ys[1].max(y)];
        }
        Some((xs, ys))
    }

    /// Write the object as ASCII PLY.
    pub fn write_ply<W: Write>(&self, mut out: W) -> io::Result<()> {
        writeln!(out, "ply")?;
        writeln!(out, "format ascii 1.0")?;
        writeln!(out, "comment {OBJECT_NAME}")?;
        writeln!(out, "element vertex {}", self.points.len())?;
        writeln!(out, "property float x")?;
        writeln!(out, "property float y")?;
        writeln!(out, "property float z")?;
        if self.colors.is_some() {
            writeln!(out, "property uchar red")?;
            writeln!(out, "property uchar green")?;
            writeln!(out, "property uchar blue")?;
        }
        writeln!(out, "end_header")?;

        for (i, [x, y, z]) in self.points.iter().enumerate() {
            match self.colors.as_ref().and_then(|c| c.get(i)) {
                Some([r, g, b]) => writeln!(out, "{x} {y} {z} {r} {g} {b}")?,
                None => writeln!(out, "{x} {y} {z}")?,
            }
        }
        out.flush()
    }

    pub fn save_ply(&self, path: &Path) -> io::Result<()> {
        let file = std::fs::File::create(path)?;
        self.write_ply(io::BufWriter::new(file))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud(n: usize) -> PointCloud {
        PointCloud::new((0..n).map(|i| [i as f32, 2.0 * i as f32, 1.0]).collect())
    }

    #[test]
    fn defaults_match_panel() {
        let s = DisplaySettings::default();
        assert_eq!(s.drop_points(), 1);
        assert_eq!(s.scale(), [0.5, 0.5, 1.0]);
    }

    #[test]
    fn settings_are_clamped() {
        let mut s = DisplaySettings::default();
        s.adjust_drop_points(-5);
        assert_eq!(s.drop_points(), 1);
        s.set_drop_points(100);
        assert_eq!(s.drop_points(), 64);
        s.set_scale(Axis::Y, 10.0);
        assert_eq!(s.scale()[1], 4.0);
        s.set_scale(Axis::Y, f32::NAN);
        assert_eq!(s.scale()[1], 1.0);
    }

    #[test]
    fn scale_steps_stay_on_tenths() {
        let mut s = DisplaySettings::default();
        for _ in 0..3 {
            s.step_scale(Axis::X, true);
        }
        assert_eq!(s.scale()[0], 0.8);
        for _ in 0..20 {
            s.step_scale(Axis::X, false);
        }
        assert_eq!(s.scale()[0], 0.1);
    }

    #[test]
    fn update_drops_every_nth_and_scales() {
        let settings = DisplaySettings::new(3, [2.0, 1.0, 0.5]);
        let mut scene = SceneCloud::new();
        scene.update(&cloud(10), 4, &settings);

        // Points 0, 3, 6, 9.
        assert_eq!(scene.len(), 4);
        assert_eq!(scene.points()[1], [6.0, 6.0, 0.5]);
        assert_eq!(scene.frame_number(), Some(4));
    }

    #[test]
    fn update_replaces_previous_contents() {
        let settings = DisplaySettings::default();
        let mut scene = SceneCloud::new();
        scene.update(&cloud(100), 1, &settings);
        scene.update(&cloud(5), 2, &settings);
        assert_eq!(scene.len(), 5);

        scene.update(&PointCloud::default(), 3, &settings);
        assert!(scene.is_empty());
        assert!(scene.view_bounds(ViewMode::Front).is_none());
    }

    #[test]
    fn colors_follow_dropped_points() {
        let colored = PointCloud::with_colors(
            vec![[0.0; 3]; 4],
            vec![[1, 1, 1], [2, 2, 2], [3, 3, 3], [4, 4, 4]],
        )
        .unwrap();
        let mut scene = SceneCloud::new();
        scene.update(&colored, 0, &DisplaySettings::new(2, [1.0; 3]));
        assert_eq!(scene.colors().unwrap(), &[[1, 1, 1], [3, 3, 3]]);
    }

    #[test]
    fn view_bounds_per_mode() {
        let mut scene = SceneCloud::new();
        scene.update(
            &PointCloud::new(vec![[-1.0, 2.0, 3.0], [1.0, -2.0, 5.0]]),
            0,
            &DisplaySettings::new(1, [1.0; 3]),
        );
        assert_eq!(
            scene.view_bounds(ViewMode::Front),
            Some(([-1.0, 1.0], [-2.0, 2.0]))
        );
        assert_eq!(
            scene.view_bounds(ViewMode::Top),
            Some(([-1.0, 1.0], [3.0, 5.0]))
        );
    }

    #[test]
    fn ply_export() {
        let mut scene = SceneCloud::new();
        scene.update(
            &PointCloud::with_colors(vec![[1.0, 2.0, 3.0]], vec![[255, 0, 7]]).unwrap(),
            0,
            &DisplaySettings::new(1, [1.0; 3]),
        );
        let mut out = Vec::new();
        scene.write_ply(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("ply\nformat ascii 1.0\n"));
        assert!(text.contains("element vertex 1\n"));
        assert!(text.contains("property uchar red\n"));
        assert!(text.ends_with("end_header\n1 2 3 255 0 7\n"));
    }
}
