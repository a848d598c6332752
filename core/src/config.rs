//! Playback tuning knobs.
//!
//! Everything here has a sensible default; embedders override fields
//! selectively (JSON or struct update syntax) and the controller
//! applies the result on the next tick. Out-of-range values are
//! clamped, never fatal.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct PlaybackConfig {
    /// Minimum wall-clock gap between frame advances, in milliseconds.
    /// ~60 fps playback at the default.
    pub frame_period_ms:        u64,
    /// Floor on the gap between two repaints, in milliseconds. A frame
    /// that lands inside the window is applied but not painted unless
    /// it carries a full invalidation.
    pub min_render_interval_ms: u64,
    /// Queue depth beyond which catch-up kicks in.
    pub backlog_threshold:      usize,
    /// Hard cap on snapshots consumed in one tick while catching up.
    pub max_catch_up:           usize,
    /// World-space radius of a rendered entity.
    pub entity_radius:          f64,
    /// Draw the sensing ring around every entity.
    pub ring_enabled:           bool,
    /// World-space radius of the sensing ring.
    pub ring_radius:            f64,
    /// Padding kept around a fitted scene, in surface pixels.
    pub fit_padding:            f64,
    /// Lower bound on the fitted scale. Keeps sparse scenes legible.
    pub min_scale:              f64,
    /// Upper bound on the fitted scale. Stops tiny scenes from blowing up.
    pub max_scale:              f64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frame_period_ms:        17,
            min_render_interval_ms: 16,
            backlog_threshold:      5,
            max_catch_up:           3,
            entity_radius:          6.0,
            ring_enabled:           false,
            ring_radius:            200.0,
            fit_padding:            40.0,
            min_scale:              0.3,
            max_scale:              1.0,
        }
    }
}

impl PlaybackConfig {
    pub fn frame_period(&self) -> Duration {
        Duration::from_millis(self.frame_period_ms)
    }

    pub fn min_render_interval(&self) -> Duration {
        Duration::from_millis(self.min_render_interval_ms)
    }

    /// Clamp out-of-range fields back into working order. Each fix is
    /// logged once so a bad embedder config is visible but never fatal.
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        if self.max_catch_up == 0 {
            log::warn!("max_catch_up of 0 would stall playback; clamping to 1");
            self.max_catch_up = 1;
        }
        if self.backlog_threshold == 0 {
            log::warn!("backlog_threshold of 0 is meaningless; using 1");
            self.backlog_threshold = 1;
        }
        if !self.entity_radius.is_finite() || self.entity_radius <= 0.0 {
            log::warn!(
                "entity_radius {} is unusable; using default {}",
                self.entity_radius,
                defaults.entity_radius
            );
            self.entity_radius = defaults.entity_radius;
        }
        if !self.ring_radius.is_finite() || self.ring_radius <= 0.0 {
            log::warn!(
                "ring_radius {} is unusable; using default {}",
                self.ring_radius,
                defaults.ring_radius
            );
            self.ring_radius = defaults.ring_radius;
        }
        if !self.fit_padding.is_finite() || self.fit_padding < 0.0 {
            self.fit_padding = defaults.fit_padding;
        }
        if !self.min_scale.is_finite() || self.min_scale <= 0.0 {
            log::warn!(
                "min_scale {} is unusable; using default {}",
                self.min_scale,
                defaults.min_scale
            );
            self.min_scale = defaults.min_scale;
        }
        if !self.max_scale.is_finite() || self.max_scale < self.min_scale {
            log::warn!(
                "max_scale {} is below min_scale {}; raising to match",
                self.max_scale,
                self.min_scale
            );
            self.max_scale = self.min_scale;
        }
        self
    }
}
