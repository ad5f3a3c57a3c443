//! Rolling-window frame and byte rate.
//!
//! Records `(timestamp, bytes)` per frame and reports frames/s and
//! bytes/s over the most recent `window`.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct RateMeter {
    samples: VecDeque<(Instant, u64)>,
    window: Duration,
    total_bytes: u64,
}

impl RateMeter {
    /// A meter with a 1-second window.
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(1))
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            samples: VecDeque::with_capacity(64),
            window,
            total_bytes: 0,
        }
    }

    /// Record one frame of `bytes` now.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Instant::now(), bytes);
    }

    pub fn record_at(&mut self, when: Instant, bytes: u64) {
        self.samples.push_back((when, bytes));
        self.total_bytes += bytes;
        self.evict(when);
    }

    /// Frames per second over the window, as of `now`.
    pub fn fps_at(&mut self, now: Instant) -> f64 {
        self.evict(now);
        self.samples.len() as f64 / self.window.as_secs_f64()
    }

    pub fn fps(&mut self) -> f64 {
        self.fps_at(Instant::now())
    }

    /// Bytes per second over the window, as of `now`.
    pub fn bytes_per_sec_at(&mut self, now: Instant) -> f64 {
        self.evict(now);
        self.total_bytes as f64 / self.window.as_secs_f64()
    }

    pub fn bytes_per_sec(&mut self) -> f64 {
        self.bytes_per_sec_at(Instant::now())
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    // ── Internal ─────────────────────────────────────────────────

    fn evict(&mut self, now: Instant) {
        while let Some(&(ts, bytes)) = self.samples.front() {
            if now.saturating_duration_since(ts) > self.window {
                self.samples.pop_front();
                self.total_bytes = self.total_bytes.saturating_sub(bytes);
            } else {
                break;
            }
        }
    }
}

impl Default for RateMeter {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_meter_is_zero() {
        let mut meter = RateMeter::new();
        assert_eq!(meter.fps(), 0.0);
        assert_eq!(meter.bytes_per_sec(), 0.0);
    }

    #[test]
    fn counts_frames_in_window() {
        let mut meter = RateMeter::with_window(Duration::from_secs(1));
        let t0 = Instant::now();
        for i in 0..30 {
            meter.record_at(t0 + Duration::from_millis(i * 33), 1000);
        }
        let now = t0 + Duration::from_millis(990);
        assert_eq!(meter.fps_at(now), 30.0);
        assert_eq!(meter.bytes_per_sec_at(now), 30_000.0);
    }

    #[test]
    fn old_samples_expire() {
        let mut meter = RateMeter::with_window(Duration::from_secs(1));
        let t0 = Instant::now();
        meter.record_at(t0, 500);
        meter.record_at(t0 + Duration::from_millis(1500), 500);
        assert_eq!(meter.sample_count(), 1);
        assert_eq!(meter.fps_at(t0 + Duration::from_secs(5)), 0.0);
    }
}
