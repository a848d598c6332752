//! Render scheduler — replays the queue at a smooth cadence.
//!
//! One entry point, `run_tick`, driven by the controller with an
//! injected `Instant`. No hidden clock: ticks are repeatable, which is
//! what makes the integration tests deterministic.
//!
//! Per tick, in order: the advance gate (no frame before
//! `frame_period` has elapsed), the catch-up policy (consume more than
//! one snapshot while the queue runs deep), dirty marking for
//! everything that changed, then the repaint throttle (skip the paint,
//! keep the regions). An empty queue is quiet waiting until the first
//! frame has played; afterwards it is the end of the stream.
//!
//! RULE: snapshots leave the queue in arrival order, always. Catch-up
//! changes how many leave per tick, never their order.

use crate::analytics::MOVEMENT_EPSILON;
use crate::config::PlaybackConfig;
use crate::dirty::DirtyTracker;
use crate::queue::{QueuedSnapshot, SnapshotQueue};
use crate::render::{RenderFrame, RenderSink};
use crate::snapshot::{EntityState, Snapshot};
use crate::types::{EntityId, Time};
use crate::viewport::{SurfaceSize, ViewportFitter, ViewportState};
use std::collections::{BTreeMap, HashSet};
use std::time::Instant;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No session on stage; nothing to do.
    Idle,
    /// Session paused; playback clock frozen.
    Paused,
    /// Advance gate closed: less than a frame period since the last
    /// advance.
    TooEarly,
    /// Queue empty before the first frame of the run. Not an ending.
    Waiting,
    /// Consumed at least one snapshot. `repainted` is false when the
    /// repaint throttle held the paint back.
    Rendered {
        consumed:       usize,
        displayed_time: Time,
        repainted:      bool,
    },
    /// Queue empty after at least one frame: the stream is over. The
    /// terminal frame has been emitted.
    Exhausted,
}

#[derive(Debug, Default)]
pub struct RenderScheduler {
    last_advance:   Option<Instant>,
    last_repaint:   Option<Instant>,
    /// Latest applied snapshot; previous world during an apply.
    current:        BTreeMap<EntityId, EntityState>,
    displayed_time: Time,
    frames_played:  u64,
    repaints:       u64,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_played(&self) -> u64 {
        self.frames_played
    }

    pub fn repaint_count(&self) -> u64 {
        self.repaints
    }

    pub fn displayed_time(&self) -> Time {
        self.displayed_time
    }

    pub fn current_entities(&self) -> &BTreeMap<EntityId, EntityState> {
        &self.current
    }

    /// Back to the blank state. Used on clear and on supersession.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// One scheduling step at `now`.
    pub fn run_tick(
        &mut self,
        now: Instant,
        queue: &SnapshotQueue,
        dirty: &mut DirtyTracker,
        viewport: &mut ViewportFitter,
        config: &PlaybackConfig,
        surface: SurfaceSize,
        sink: &mut dyn RenderSink,
    ) -> TickOutcome {
        if let Some(last) = self.last_advance {
            if now.duration_since(last) < config.frame_period() {
                return TickOutcome::TooEarly;
            }
        }

        if queue.is_empty() {
            if self.frames_played == 0 {
                return TickOutcome::Waiting;
            }
            return self.finish_stream(now, dirty, viewport, config, surface, sink);
        }

        let backlog = queue.len();
        let to_consume = if backlog > config.backlog_threshold {
            config.max_catch_up.min(backlog / 2)
        } else {
            1
        };
        if to_consume > 1 {
            log::debug!("backlog of {backlog} snapshots; consuming {to_consume} this tick");
        }

        let mut consumed = 0;
        let mut last_viewport = None;
        for _ in 0..to_consume {
            match queue.dequeue() {
                Some(item) => {
                    last_viewport = Some(self.apply(item, dirty, viewport, config, surface));
                    consumed += 1;
                }
                None => break,
            }
        }
        let last_viewport = match last_viewport {
            Some(v) => v,
            // A producer cannot remove entries, so a non-empty queue
            // yielding nothing means a concurrent clear; wait it out.
            None => return TickOutcome::Waiting,
        };
        self.last_advance = Some(now);

        let full_pending = dirty.full_pending();
        let throttled = match self.last_repaint {
            Some(last) => now.duration_since(last) < config.min_render_interval(),
            None => false,
        };
        let repainted = if !throttled || full_pending {
            let scope = dirty.drain();
            if scope.is_full() {
                viewport.acknowledge_full();
            }
            sink.repaint(RenderFrame {
                scope,
                entities: &self.current,
                time: self.displayed_time,
                viewport: last_viewport,
                terminal: false,
            });
            self.last_repaint = Some(now);
            self.repaints += 1;
            true
        } else {
            false
        };

        TickOutcome::Rendered {
            consumed,
            displayed_time: self.displayed_time,
            repainted,
        }
    }

    /// Applies one snapshot: fit the viewport if this is the run's
    /// first, mark everything that changed, take over the world state.
    /// Returns the viewport mapping in force for this snapshot.
    fn apply(
        &mut self,
        item: QueuedSnapshot,
        dirty: &mut DirtyTracker,
        viewport: &mut ViewportFitter,
        config: &PlaybackConfig,
        surface: SurfaceSize,
    ) -> ViewportState {
        let QueuedSnapshot { snapshot, movement } = item;

        let state = viewport.ensure(&snapshot, surface, config);
        if state.needs_full_invalidate {
            dirty.request_full();
        }

        // Region size in world units: the entity dot is a fixed pixel
        // radius, the ring (when drawn) a fixed world radius.
        let mut radius = config.entity_radius / state.scale;
        if config.ring_enabled {
            radius += config.ring_radius;
        }

        let tagged: Option<HashSet<EntityId>> = movement
            .as_ref()
            .map(|tag| tag.moved.iter().copied().collect());

        for (id, entity) in &snapshot.entities {
            match self.current.get(id) {
                // Appeared.
                None => dirty.mark(entity.pos, radius),
                Some(old) => {
                    let moved = match &tagged {
                        Some(set) => set.contains(id),
                        None => old.pos.dist(entity.pos) > MOVEMENT_EPSILON,
                    };
                    if moved {
                        dirty.mark_transition(old.pos, entity.pos, radius);
                    } else if old != entity {
                        // Phase, marker, or multiplicity changed while
                        // standing still; repaint in place.
                        dirty.mark(entity.pos, radius);
                    }
                }
            }
        }
        // Disappeared: erase at the last known spot.
        for (id, old) in &self.current {
            if !snapshot.entities.contains_key(id) {
                dirty.mark(old.pos, radius);
            }
        }

        self.displayed_time = snapshot.time;
        self.current = snapshot.entities;
        self.frames_played += 1;
        state
    }

    /// Emits the terminal frame and reports the end of the stream.
    fn finish_stream(
        &mut self,
        now: Instant,
        dirty: &mut DirtyTracker,
        viewport: &mut ViewportFitter,
        config: &PlaybackConfig,
        surface: SurfaceSize,
        sink: &mut dyn RenderSink,
    ) -> TickOutcome {
        let viewport_state = match viewport.current() {
            Some(v) => v,
            // A resize or overlay toggle can land between the last
            // played snapshot and this tick. Refit from the world we
            // still hold so the terminal frame goes out regardless.
            None => {
                let mut last = Snapshot::new(self.displayed_time);
                last.entities = self.current.clone();
                viewport.ensure(&last, surface, config)
            }
        };
        // The end-of-run overlay restyles every entity, so the last
        // paint covers everything.
        dirty.request_full();
        let scope = dirty.drain();
        viewport.acknowledge_full();
        sink.repaint(RenderFrame {
            scope,
            entities: &self.current,
            time: self.displayed_time,
            viewport: viewport_state,
            terminal: true,
        });
        self.last_repaint = Some(now);
        self.repaints += 1;
        log::info!(
            "stream exhausted after {} frames, displayed time {:.3}",
            self.frames_played,
            self.displayed_time
        );
        TickOutcome::Exhausted
    }
}
