//! Playback controller — the façade hosts drive.
//!
//! Owns every moving part (session, queue, scheduler, dirty tracker,
//! viewport fitter, offload channel, run gate) so there is exactly one
//! place where lifecycle transitions happen and no free-standing state
//! anywhere else.
//!
//! RULE: `start` supersedes unconditionally. Whatever was playing is
//! wiped first; data from the old run arriving late bounces off the
//! run gate.
//!
//! RULE: invalid transitions (pausing an idle session, resuming a
//! running one) are logged no-ops, never errors.

use crate::analytics::BatchStats;
use crate::config::PlaybackConfig;
use crate::dirty::DirtyTracker;
use crate::error::{PlaybackError, PlaybackResult};
use crate::ingress::{
    Admission, IngestReport, IngressEvent, IngressHandle, RunGate, SnapshotEnvelope,
};
use crate::offload::{OffloadChannel, OffloadKind, OffloadRequest, OffloadResponse};
use crate::queue::{QueuedSnapshot, SnapshotQueue};
use crate::render::RenderSink;
use crate::scheduler::{RenderScheduler, TickOutcome};
use crate::session::{RunSession, RunStatus};
use crate::snapshot::{EntityState, Snapshot};
use crate::types::{EntityId, RunId, Time};
use crate::viewport::{SurfaceSize, ViewportFitter, ViewportState};
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

pub struct PlaybackController {
    session:       RunSession,
    config:        PlaybackConfig,
    surface:       SurfaceSize,
    queue:         SnapshotQueue,
    scheduler:     RenderScheduler,
    dirty:         DirtyTracker,
    viewport:      ViewportFitter,
    offload:       OffloadChannel,
    gate:          RunGate,
    /// Batches waiting for the processing slot, oldest first.
    parked:     VecDeque<(RunId, Vec<Snapshot>)>,
    last_stats: Option<BatchStats>,
}

impl PlaybackController {
    /// Controller with a background analytics worker.
    pub fn new(config: PlaybackConfig) -> Self {
        Self::with_offload(config, OffloadChannel::with_worker())
    }

    /// Controller with inline analytics, for hosts that forbid
    /// background threads.
    pub fn synchronous(config: PlaybackConfig) -> Self {
        Self::with_offload(config, OffloadChannel::synchronous())
    }

    fn with_offload(config: PlaybackConfig, offload: OffloadChannel) -> Self {
        Self {
            session:       RunSession::idle(),
            config:        config.sanitized(),
            surface:       SurfaceSize::default(),
            queue:         SnapshotQueue::new(),
            scheduler:     RenderScheduler::new(),
            dirty:         DirtyTracker::new(),
            viewport:      ViewportFitter::new(),
            offload,
            gate:          RunGate::new(),
            parked:        VecDeque::new(),
            last_stats:    None,
        }
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Starts playback of `run_id`, superseding whatever was on stage.
    pub fn start(&mut self, run_id: impl Into<RunId>) {
        let run_id = run_id.into();
        if let Some(old) = self.session.run_id.as_deref() {
            if self.session.status != RunStatus::Idle {
                log::info!("run {run_id} supersedes {old}");
            }
        }
        self.wipe_playback_state();
        self.clear_analytics_cache();
        self.gate.open(run_id.clone());
        self.session.begin(run_id.clone());
        log::info!("playback started for run {run_id}");
    }

    pub fn pause(&mut self) {
        match self.session.status {
            RunStatus::Running => {
                self.session.status = RunStatus::Paused;
                log::info!(
                    "playback paused at t={:.3}",
                    self.scheduler.displayed_time()
                );
            }
            status => log::debug!("pause ignored while {status:?}"),
        }
    }

    pub fn resume(&mut self) {
        match self.session.status {
            RunStatus::Paused => {
                self.session.status = RunStatus::Running;
                log::info!("playback resumed");
            }
            status => log::debug!("resume ignored while {status:?}"),
        }
    }

    /// Ends the session. Buffered data stays until `clear` but is
    /// never played; ingress stops accepting.
    pub fn end(&mut self) {
        match self.session.status {
            RunStatus::Running | RunStatus::Paused => {
                self.session.status = RunStatus::Ended;
                self.gate.close();
                log::info!(
                    "playback ended for run {:?} with {} snapshots left buffered",
                    self.session.run_id,
                    self.queue.len()
                );
            }
            status => log::debug!("end ignored while {status:?}"),
        }
    }

    /// Hard cancellation: every component back to blank, session back
    /// to `Idle`. Clearing an idle controller changes nothing.
    pub fn clear(&mut self) {
        if self.session.status == RunStatus::Idle && self.session.run_id.is_none() {
            return;
        }
        self.wipe_playback_state();
        self.clear_analytics_cache();
        self.gate.reset();
        self.session = RunSession::idle();
        log::info!("playback state cleared");
    }

    /// Drops everything belonging to the current run.
    fn wipe_playback_state(&mut self) {
        let dropped = self.queue.clear();
        if dropped > 0 {
            log::debug!("discarded {dropped} buffered snapshots");
        }
        self.scheduler.reset();
        self.dirty.reset();
        self.viewport.reset();
        self.parked.clear();
        self.last_stats = None;
    }

    /// Best effort: the movement memo is also keyed by run, so a
    /// missed clear cannot corrupt a new run's diffs.
    fn clear_analytics_cache(&mut self) {
        if let Err(err) = self.offload.send(OffloadRequest::ClearCache) {
            log::debug!("cache clear not sent: {err}");
        }
    }

    // ── Ingest ─────────────────────────────────────────────────────

    /// Accepts playback data while the session is active. Per-envelope
    /// admission; rejects never abort the rest of a batch.
    pub fn ingest(&mut self, event: IngressEvent) -> PlaybackResult<IngestReport> {
        if !self.session.is_active() {
            return Err(PlaybackError::InactiveSession {
                status: self.session.status,
            });
        }
        match event {
            IngressEvent::Single { envelope } => Ok(self.ingest_single(envelope)),
            IngressEvent::Batch { envelopes } => Ok(self.ingest_batch(envelopes)),
        }
    }

    fn ingest_single(&mut self, envelope: SnapshotEnvelope) -> IngestReport {
        let mut report = IngestReport::default();
        match self.gate.admit(&envelope) {
            Admission::Accepted => {
                self.queue.enqueue(QueuedSnapshot::bare(envelope.snapshot));
                report.accepted = 1;
            }
            _ => report.dropped = 1,
        }
        report
    }

    fn ingest_batch(&mut self, envelopes: Vec<SnapshotEnvelope>) -> IngestReport {
        let mut report = IngestReport::default();
        let mut snapshots = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            match self.gate.admit(&envelope) {
                Admission::Accepted => {
                    snapshots.push(envelope.snapshot);
                    report.accepted += 1;
                }
                _ => report.dropped += 1,
            }
        }
        if snapshots.is_empty() {
            return report;
        }
        let run_id = match self.session.run_id.clone() {
            Some(id) => id,
            None => return report, // active session always carries an id
        };

        if self.offload.is_busy(OffloadKind::ProcessBatch) {
            // The processing slot is taken. Dispatching this batch by
            // another path would let it overtake the one in flight, so
            // it parks until the slot frees.
            log::debug!(
                "batch processing slot busy; parking {} snapshots",
                snapshots.len()
            );
            self.parked.push_back((run_id, snapshots));
        } else {
            self.dispatch_batch(run_id, snapshots);
        }
        report
    }

    /// Hands one admitted batch to the offload channel: stats first
    /// (informational, skipped when its slot is busy), then the
    /// processing request that will feed the queue.
    fn dispatch_batch(&mut self, run_id: RunId, snapshots: Vec<Snapshot>) {
        let stats_request = OffloadRequest::ComputeStats {
            run_id:    run_id.clone(),
            snapshots: snapshots.clone(),
        };
        if let Err(err) = self.offload.send(stats_request) {
            log::debug!("batch stats skipped: {err}");
        }
        if let Err(err) = self
            .offload
            .send(OffloadRequest::ProcessBatch { run_id, snapshots })
        {
            log::warn!("batch processing rejected: {err}");
        }
    }

    /// Stores producer-supplied stats. Purely informational; never
    /// touches playback ordering.
    pub fn stats_available(&mut self, stats: BatchStats) {
        self.last_stats = Some(stats);
    }

    // ── Tick ───────────────────────────────────────────────────────

    /// One step at `now`: collect finished offload work, then drive the
    /// scheduler according to the session state.
    pub fn tick(&mut self, now: Instant, sink: &mut dyn RenderSink) -> TickOutcome {
        self.collect_offload();
        match self.session.status {
            RunStatus::Idle | RunStatus::Ended => TickOutcome::Idle,
            // While paused the scheduler is not invoked at all, so its
            // timestamps freeze and resume picks up seamlessly.
            RunStatus::Paused => TickOutcome::Paused,
            RunStatus::Running => {
                // An empty queue with a batch still being tagged is
                // pending playback data, not the end of the stream.
                if self.queue.is_empty()
                    && self.scheduler.frames_played() > 0
                    && (self.offload.is_busy(OffloadKind::ProcessBatch)
                        || !self.parked.is_empty())
                {
                    return TickOutcome::Waiting;
                }
                let outcome = self.scheduler.run_tick(
                    now,
                    &self.queue,
                    &mut self.dirty,
                    &mut self.viewport,
                    &self.config,
                    self.surface,
                    sink,
                );
                if matches!(outcome, TickOutcome::Exhausted) {
                    self.session.status = RunStatus::Ended;
                    self.gate.close();
                }
                outcome
            }
        }
    }

    /// Collects finished offload work. Batch results feed the queue;
    /// the rest is informational.
    fn collect_offload(&mut self) {
        for response in self.offload.poll() {
            match response {
                OffloadResponse::BatchProcessed { run_id, items } => {
                    if self.session.is_active() && self.session.matches(&run_id) {
                        log::debug!("queuing processed batch of {}", items.len());
                        self.queue.enqueue_all(items);
                    } else {
                        log::debug!("discarding processed batch for superseded run {run_id}");
                    }
                }
                OffloadResponse::StatsComputed { run_id, stats } => {
                    if self.session.matches(&run_id) {
                        log::debug!(
                            "batch stats: {} snapshots, {} entities, total distance {:.3}",
                            stats.snapshot_count,
                            stats.entity_count,
                            stats.total_distance
                        );
                        self.last_stats = Some(stats);
                    }
                }
                // Per-snapshot detection is a channel-level operation;
                // the controller's single-snapshot path diffs inline.
                OffloadResponse::MovementDetected { run_id, tag } => {
                    if self.session.matches(&run_id) {
                        log::debug!("{} entities moved in run {run_id}", tag.moved.len());
                    }
                }
                OffloadResponse::CacheCleared => {}
            }
        }
        self.flush_parked();
    }

    /// Dispatches parked batches while the processing slot is free.
    /// Batches for a superseded run are dropped on the way out.
    fn flush_parked(&mut self) {
        while !self.offload.is_busy(OffloadKind::ProcessBatch) {
            match self.parked.pop_front() {
                Some((run_id, snapshots))
                    if self.session.is_active() && self.session.matches(&run_id) =>
                {
                    self.dispatch_batch(run_id, snapshots);
                }
                Some((run_id, _)) => {
                    log::debug!("dropping parked batch for superseded run {run_id}");
                }
                None => break,
            }
        }
    }

    // ── Host-driven geometry & config ──────────────────────────────

    /// Applies a new config. Changes that affect framing schedule a
    /// one-shot refit plus full repaint.
    pub fn update_config(&mut self, config: PlaybackConfig) {
        let config = config.sanitized();
        let refit = config.ring_enabled != self.config.ring_enabled
            || config.ring_radius != self.config.ring_radius
            || config.fit_padding != self.config.fit_padding
            || config.min_scale != self.config.min_scale
            || config.max_scale != self.config.max_scale;
        self.config = config;
        if refit {
            log::debug!("framing config changed; refit scheduled");
            self.viewport.invalidate();
            self.dirty.request_full();
        }
    }

    pub fn set_surface(&mut self, surface: SurfaceSize) {
        if surface != self.surface {
            self.surface = surface;
            self.viewport.invalidate();
            self.dirty.request_full();
            log::debug!(
                "surface resized to {:.0}x{:.0}; refit scheduled",
                surface.width,
                surface.height
            );
        }
    }

    // ── Accessors ──────────────────────────────────────────────────

    pub fn status(&self) -> RunStatus {
        self.session.status
    }

    pub fn run_id(&self) -> Option<&str> {
        self.session.run_id.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_active()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn viewport(&self) -> Option<ViewportState> {
        self.viewport.current()
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn surface(&self) -> SurfaceSize {
        self.surface
    }

    pub fn entities(&self) -> &BTreeMap<EntityId, EntityState> {
        self.scheduler.current_entities()
    }

    pub fn displayed_time(&self) -> Time {
        self.scheduler.displayed_time()
    }

    pub fn frames_played(&self) -> u64 {
        self.scheduler.frames_played()
    }

    pub fn repaint_count(&self) -> u64 {
        self.scheduler.repaint_count()
    }

    pub fn last_stats(&self) -> Option<&BatchStats> {
        self.last_stats.as_ref()
    }

    pub fn dropped_stale(&self) -> u64 {
        self.gate.dropped_stale()
    }

    pub fn dropped_malformed(&self) -> u64 {
        self.gate.dropped_malformed()
    }

    /// True once analytics run inline (chosen at construction or after
    /// a worker loss).
    pub fn analytics_synchronous(&self) -> bool {
        self.offload.is_synchronous()
    }

    /// Clonable delivery handle for the transport thread.
    pub fn ingress_handle(&self) -> IngressHandle {
        IngressHandle::new(self.gate.clone(), self.queue.clone())
    }
}
