//! Dirty-region tracker — decides how much of the surface a repaint
//! must cover.
//!
//! Movement and entity churn mark small circular regions; structural
//! changes (first fit, resize, overlay toggles) request a full
//! invalidation that swallows the region set. The scheduler drains the
//! tracker exactly once per repaint; `drain` returns the accumulated
//! scope and resets in the same call, so double-processing a region is
//! unrepresentable rather than merely discouraged.
//!
//! RULE: regions accumulate across throttled ticks — skipping a repaint
//! must never lose paint work.

use crate::types::Point;
use serde::{Deserialize, Serialize};

/// A circle of the world needing repaint, in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirtyRegion {
    pub center: Point,
    pub radius: f64,
}

/// What a repaint must cover.
#[derive(Debug, Clone, PartialEq)]
pub enum RepaintScope {
    /// Redraw everything. Region detail was discarded as redundant.
    Full,
    /// Redraw only these circles.
    Regions(Vec<DirtyRegion>),
}

impl RepaintScope {
    pub fn is_full(&self) -> bool {
        matches!(self, RepaintScope::Full)
    }

    pub fn region_count(&self) -> usize {
        match self {
            RepaintScope::Full => 0,
            RepaintScope::Regions(regions) => regions.len(),
        }
    }
}

#[derive(Debug, Default)]
pub struct DirtyTracker {
    regions:   Vec<DirtyRegion>,
    full:      bool,
    /// Drains performed, kept for run summaries.
    drains:    u64,
    /// Full invalidations requested, kept for run summaries.
    full_reqs: u64,
}

impl DirtyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, center: Point, radius: f64) {
        if self.full {
            return; // already covered
        }
        self.regions.push(DirtyRegion { center, radius });
    }

    /// Marks both ends of a move: erase at the old position, paint at
    /// the new one.
    pub fn mark_transition(&mut self, old: Point, new: Point, radius: f64) {
        self.mark(old, radius);
        self.mark(new, radius);
    }

    /// Escalates the pending scope to a full redraw. Accumulated
    /// regions are dropped; the full repaint covers them.
    pub fn request_full(&mut self) {
        if !self.full {
            self.full = true;
            self.full_reqs += 1;
            self.regions.clear();
        }
    }

    /// Returns the accumulated scope and resets the tracker. The one
    /// call the scheduler makes per repaint.
    pub fn drain(&mut self) -> RepaintScope {
        self.drains += 1;
        if self.full {
            self.full = false;
            self.regions.clear();
            RepaintScope::Full
        } else {
            RepaintScope::Regions(std::mem::take(&mut self.regions))
        }
    }

    /// Drops pending state without counting a drain. Used on clear.
    pub fn reset(&mut self) {
        self.regions.clear();
        self.full = false;
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty() && !self.full
    }

    pub fn full_pending(&self) -> bool {
        self.full
    }

    pub fn drain_count(&self) -> u64 {
        self.drains
    }

    pub fn full_request_count(&self) -> u64 {
        self.full_reqs
    }
}
