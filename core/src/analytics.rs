//! Movement analytics — the computations the offload channel ships out.
//!
//! Everything here is a pure function over explicit state, shared by
//! the worker thread and the synchronous fallback so both paths produce
//! identical numbers. The only mutable piece is [`MovementCache`], the
//! previous-position memo owned by whichever side is executing.

use crate::queue::QueuedSnapshot;
use crate::snapshot::Snapshot;
use crate::types::{EntityId, Point, RunId, Time};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Displacements at or below this are jitter, not movement. Matches the
/// producer's own precision threshold (5 decimal places).
pub const MOVEMENT_EPSILON: f64 = 1e-5;

/// Which entities moved between two consecutive snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementTag {
    pub moved:          Vec<EntityId>,
    pub total_distance: f64,
}

impl MovementTag {
    pub fn stationary() -> Self {
        Self {
            moved:          Vec::new(),
            total_distance: 0.0,
        }
    }
}

/// Aggregate numbers over one ingested batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub snapshot_count: usize,
    /// Population of the batch's final snapshot.
    pub entity_count:   usize,
    pub first_time:     Time,
    pub last_time:      Time,
    /// Sum of every above-epsilon displacement inside the batch.
    pub total_distance: f64,
    /// Largest single displacement.
    pub max_step:       f64,
    /// Mean over above-epsilon displacements only.
    pub mean_step:      f64,
}

/// Previous-position memo keyed by run, so a superseding run never
/// diffs against a stale world.
#[derive(Debug, Default)]
pub struct MovementCache {
    run:  Option<RunId>,
    prev: HashMap<EntityId, Point>,
}

impl MovementCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        self.run = None;
        self.prev.clear();
    }

    /// Points the memo at `run_id`, wiping it when the run changed.
    fn align_to(&mut self, run_id: &RunId) {
        if self.run.as_ref() != Some(run_id) {
            self.prev.clear();
            self.run = Some(run_id.clone());
        }
    }

    fn remember(&mut self, snapshot: &Snapshot) {
        self.prev.clear();
        for (id, entity) in &snapshot.entities {
            self.prev.insert(*id, entity.pos);
        }
    }
}

/// Diffs `snapshot` against `prev`. Entities absent from `prev`
/// (appearances) are not movement; the scheduler tracks churn itself.
pub fn detect_movement(prev: &HashMap<EntityId, Point>, snapshot: &Snapshot) -> MovementTag {
    let mut moved = Vec::new();
    let mut total_distance = 0.0;
    for (id, entity) in &snapshot.entities {
        if let Some(old) = prev.get(id) {
            let d = old.dist(entity.pos);
            if d > MOVEMENT_EPSILON {
                moved.push(*id);
                total_distance += d;
            }
        }
    }
    MovementTag {
        moved,
        total_distance,
    }
}

/// Tags every snapshot of a batch with its movement relative to the
/// one before it (the cache supplies continuity across batches) and
/// advances the cache to the batch's final snapshot.
pub fn process_batch(
    cache: &mut MovementCache,
    run_id: &RunId,
    snapshots: Vec<Snapshot>,
) -> Vec<QueuedSnapshot> {
    cache.align_to(run_id);
    let mut out = Vec::with_capacity(snapshots.len());
    for snapshot in snapshots {
        let tag = detect_movement(&cache.prev, &snapshot);
        cache.remember(&snapshot);
        out.push(QueuedSnapshot {
            snapshot,
            movement: Some(tag),
        });
    }
    out
}

/// Single-snapshot variant of [`process_batch`]: diffs against the
/// cache, advances it, returns only the tag.
pub fn detect_movement_cached(
    cache: &mut MovementCache,
    run_id: &RunId,
    snapshot: &Snapshot,
) -> MovementTag {
    cache.align_to(run_id);
    let tag = detect_movement(&cache.prev, snapshot);
    cache.remember(snapshot);
    tag
}

/// Aggregates a batch. An empty batch yields all-zero stats.
pub fn batch_stats(snapshots: &[Snapshot]) -> BatchStats {
    let mut total_distance = 0.0;
    let mut max_step: f64 = 0.0;
    let mut steps = 0usize;

    for pair in snapshots.windows(2) {
        for (id, entity) in &pair[1].entities {
            if let Some(old) = pair[0].entities.get(id) {
                let d = old.pos.dist(entity.pos);
                if d > MOVEMENT_EPSILON {
                    total_distance += d;
                    max_step = max_step.max(d);
                    steps += 1;
                }
            }
        }
    }

    BatchStats {
        snapshot_count: snapshots.len(),
        entity_count:   snapshots.last().map_or(0, |s| s.entities.len()),
        first_time:     snapshots.first().map_or(0.0, |s| s.time),
        last_time:      snapshots.last().map_or(0.0, |s| s.time),
        total_distance,
        max_step,
        mean_step:      if steps > 0 {
            total_distance / steps as f64
        } else {
            0.0
        },
    }
}
