//! Viewport fitter — one-shot framing of a run.
//!
//! The first snapshot of a run decides the world-to-surface mapping:
//! union bounding box, padded, uniformly scaled into the surface, scale
//! clamped so sparse scenes stay legible and tiny scenes do not blow
//! up. After that the mapping is frozen for the whole run — entities
//! walking out of frame is accepted; a jittering camera is not.
//!
//! RULE: refits happen only through `invalidate` (surface resize,
//! overlay toggle) or a new run. Never per frame.

use crate::config::PlaybackConfig;
use crate::snapshot::Snapshot;
use crate::types::Point;
use serde::{Deserialize, Serialize};

/// Drawable surface extent, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SurfaceSize {
    pub width:  f64,
    pub height: f64,
}

impl SurfaceSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

impl Default for SurfaceSize {
    /// Placeholder extent until the host reports real geometry.
    fn default() -> Self {
        Self {
            width:  800.0,
            height: 600.0,
        }
    }
}

/// The published world-to-surface mapping: world coordinates are offset
/// by the center and multiplied by `scale`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewportState {
    pub scale:    f64,
    pub center_x: f64,
    pub center_y: f64,
    /// Set by a fresh fit; the next repaint must cover the full
    /// surface. Cleared via `ViewportFitter::acknowledge_full`.
    #[serde(skip)]
    pub needs_full_invalidate: bool,
}

/// Computes the mapping for one snapshot on one surface. Pure; the
/// cached lifecycle lives in [`ViewportFitter`].
pub fn fit(snapshot: &Snapshot, surface: SurfaceSize, config: &PlaybackConfig) -> ViewportState {
    // The ring is drawn in world units, so an enabled overlay widens
    // the extent that has to fit on screen.
    let ring_extent = if config.ring_enabled {
        config.ring_radius
    } else {
        0.0
    };

    let (min, max) = snapshot
        .bounding_box()
        .unwrap_or((Point::new(0.0, 0.0), Point::new(0.0, 0.0)));

    let world_w = (max.x - min.x) + 2.0 * ring_extent;
    let world_h = (max.y - min.y) + 2.0 * ring_extent;
    let avail_w = (surface.width - 2.0 * config.fit_padding).max(1.0);
    let avail_h = (surface.height - 2.0 * config.fit_padding).max(1.0);

    // Degenerate extents (empty or coincident scene) yield an infinite
    // raw scale, which the clamp lands on the upper bound.
    let scale_x = if world_w > f64::EPSILON {
        avail_w / world_w
    } else {
        f64::INFINITY
    };
    let scale_y = if world_h > f64::EPSILON {
        avail_h / world_h
    } else {
        f64::INFINITY
    };
    let scale = scale_x
        .min(scale_y)
        .max(config.min_scale)
        .min(config.max_scale);

    ViewportState {
        scale,
        center_x: (min.x + max.x) / 2.0,
        center_y: (min.y + max.y) / 2.0,
        needs_full_invalidate: true,
    }
}

/// Caches the fitted state for the lifetime of a run.
#[derive(Debug, Default)]
pub struct ViewportFitter {
    state: Option<ViewportState>,
}

impl ViewportFitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the run's mapping, computing it from `snapshot` on the
    /// first call after construction, `invalidate`, or `reset`.
    pub fn ensure(
        &mut self,
        snapshot: &Snapshot,
        surface: SurfaceSize,
        config: &PlaybackConfig,
    ) -> ViewportState {
        if let Some(state) = self.state {
            return state;
        }
        let state = fit(snapshot, surface, config);
        log::debug!(
            "viewport fitted: scale {:.3}, center ({:.1}, {:.1})",
            state.scale,
            state.center_x,
            state.center_y
        );
        self.state = Some(state);
        state
    }

    pub fn current(&self) -> Option<ViewportState> {
        self.state
    }

    /// Forces a refit on the next `ensure`. Surface resize and overlay
    /// toggles route through here.
    pub fn invalidate(&mut self) {
        if self.state.take().is_some() {
            log::debug!("viewport invalidated; will refit on next snapshot");
        }
    }

    /// The full repaint implied by a fresh fit has happened.
    pub fn acknowledge_full(&mut self) {
        if let Some(state) = self.state.as_mut() {
            state.needs_full_invalidate = false;
        }
    }

    /// Forgets the run entirely. Used on clear.
    pub fn reset(&mut self) {
        self.state = None;
    }
}
