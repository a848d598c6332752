//! Ingress boundary — admission control for snapshots arriving off the
//! wire.
//!
//! The transport (websocket, IPC, test fixture) hands envelopes to an
//! [`IngressHandle`]; the handle checks them against the shared
//! [`RunGate`] and enqueues the survivors. Drops are counted and
//! logged, never fatal: a malformed or stale payload must not be able
//! to take playback down.
//!
//! RULE: stale-run drops are routine during supersession and log at
//! debug. Malformed payloads are producer bugs and log at warn.

use crate::error::PlaybackResult;
use crate::queue::{QueuedSnapshot, SnapshotQueue};
use crate::snapshot::Snapshot;
use crate::types::RunId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};

/// A snapshot stamped with the run that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub run_id:   RunId,
    pub snapshot: Snapshot,
}

/// What the transport delivers: one snapshot or a burst of them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngressEvent {
    Single { envelope: SnapshotEnvelope },
    Batch { envelopes: Vec<SnapshotEnvelope> },
}

impl IngressEvent {
    pub fn single(run_id: impl Into<RunId>, snapshot: Snapshot) -> Self {
        IngressEvent::Single {
            envelope: SnapshotEnvelope {
                run_id: run_id.into(),
                snapshot,
            },
        }
    }

    /// Wraps a burst of snapshots from one run.
    pub fn batch(run_id: impl Into<RunId>, snapshots: Vec<Snapshot>) -> Self {
        let run_id = run_id.into();
        IngressEvent::Batch {
            envelopes: snapshots
                .into_iter()
                .map(|snapshot| SnapshotEnvelope {
                    run_id: run_id.clone(),
                    snapshot,
                })
                .collect(),
        }
    }

    pub fn from_json(payload: &str) -> PlaybackResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }

    pub fn envelope_count(&self) -> usize {
        match self {
            IngressEvent::Single { .. } => 1,
            IngressEvent::Batch { envelopes } => envelopes.len(),
        }
    }
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    Accepted,
    NotAccepting,
    StaleRun,
    Malformed,
}

#[derive(Debug, Default)]
struct GateState {
    run_id:            Option<RunId>,
    accepting:         bool,
    dropped_stale:     u64,
    dropped_malformed: u64,
}

/// Shared admission state between the controller (which opens and
/// closes it) and every ingress handle (which consults it).
#[derive(Debug, Clone, Default)]
pub struct RunGate {
    state: Arc<Mutex<GateState>>,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts admitting data for `run_id`. Drop counters restart with
    /// the run.
    pub fn open(&self, run_id: RunId) {
        let mut state = self.lock();
        state.run_id = Some(run_id);
        state.accepting = true;
        state.dropped_stale = 0;
        state.dropped_malformed = 0;
    }

    /// Stops admitting while keeping the run id and counters readable.
    /// Used when a session ends.
    pub fn close(&self) {
        self.lock().accepting = false;
    }

    /// Back to the blank state. Used on clear.
    pub fn reset(&self) {
        *self.lock() = GateState::default();
    }

    pub fn is_accepting(&self) -> bool {
        self.lock().accepting
    }

    pub fn expected_run(&self) -> Option<RunId> {
        self.lock().run_id.clone()
    }

    pub fn dropped_stale(&self) -> u64 {
        self.lock().dropped_stale
    }

    pub fn dropped_malformed(&self) -> u64 {
        self.lock().dropped_malformed
    }

    /// The admission check proper. Bumps the drop counters and logs on
    /// rejection; the caller only routes.
    pub(crate) fn admit(&self, envelope: &SnapshotEnvelope) -> Admission {
        let mut state = self.lock();
        if !state.accepting {
            state.dropped_stale += 1;
            log::debug!(
                "dropping snapshot for run {}: no active session",
                envelope.run_id
            );
            return Admission::NotAccepting;
        }
        if state.run_id.as_ref() != Some(&envelope.run_id) {
            state.dropped_stale += 1;
            log::debug!(
                "dropping stale snapshot: expected run {:?}, got {}",
                state.run_id,
                envelope.run_id
            );
            return Admission::StaleRun;
        }
        if let Err(err) = envelope.snapshot.validate() {
            state.dropped_malformed += 1;
            log::warn!("dropping snapshot for run {}: {err}", envelope.run_id);
            return Admission::Malformed;
        }
        Admission::Accepted
    }

    fn lock(&self) -> MutexGuard<'_, GateState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Per-delivery accounting returned to the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub dropped:  usize,
}

/// Clonable delivery handle for the transport thread. Performs the same
/// admission as the controller's `ingest` and appends straight to the
/// queue; batch analytics stay on the controller-side path.
#[derive(Debug, Clone)]
pub struct IngressHandle {
    gate:  RunGate,
    queue: SnapshotQueue,
}

impl IngressHandle {
    pub(crate) fn new(gate: RunGate, queue: SnapshotQueue) -> Self {
        Self { gate, queue }
    }

    pub fn deliver(&self, event: IngressEvent) -> IngestReport {
        let envelopes = match event {
            IngressEvent::Single { envelope } => vec![envelope],
            IngressEvent::Batch { envelopes } => envelopes,
        };
        let mut report = IngestReport::default();
        let mut admitted = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            match self.gate.admit(&envelope) {
                Admission::Accepted => {
                    admitted.push(QueuedSnapshot::bare(envelope.snapshot));
                    report.accepted += 1;
                }
                _ => report.dropped += 1,
            }
        }
        self.queue.enqueue_all(admitted);
        report
    }

    /// Parses and delivers a raw JSON payload in one step.
    pub fn deliver_json(&self, payload: &str) -> PlaybackResult<IngestReport> {
        Ok(self.deliver(IngressEvent::from_json(payload)?))
    }
}
