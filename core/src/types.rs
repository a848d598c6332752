//! Shared primitive types used across the entire playback core.

use serde::{Deserialize, Serialize};

/// Simulation time in seconds, as stamped by the producer.
pub type Time = f64;

/// A stable, unique identifier for one tracked entity within a run.
pub type EntityId = u32;

/// The canonical run identifier. Opaque to the core — minted by whoever
/// starts the run, compared only for equality.
pub type RunId = String;

/// A point in world coordinates (the producer's frame, not pixels).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn dist(&self, other: Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Both coordinates are finite (not NaN, not ±inf).
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}
