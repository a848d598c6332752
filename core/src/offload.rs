//! Offload channel — ships movement analytics off the tick path.
//!
//! Two interchangeable modes behind one API. Worker mode runs the
//! computations on a named background thread fed by unbounded channels;
//! the synchronous fallback runs them in place and buffers the results.
//! Either way the caller submits with `send` and collects with `poll`
//! during tick, so playback code never blocks on analytics.
//!
//! RULE: one request of a given kind in flight at a time. A second
//! submission of the same kind is rejected with `OffloadBusy`, never
//! queued behind the first.
//!
//! RULE: worker loss is a degradation, not a failure. Any channel error
//! flips the mode to synchronous permanently and playback carries on.

use crate::analytics::{self, BatchStats, MovementCache, MovementTag};
use crate::error::{PlaybackError, PlaybackResult};
use crate::queue::QueuedSnapshot;
use crate::snapshot::Snapshot;
use crate::types::RunId;
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use std::collections::{HashSet, VecDeque};
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffloadKind {
    ProcessBatch,
    ComputeStats,
    DetectMovement,
    ClearCache,
}

#[derive(Debug)]
pub enum OffloadRequest {
    /// Tag every snapshot of a batch with movement info, in order.
    ProcessBatch {
        run_id:    RunId,
        snapshots: Vec<Snapshot>,
    },
    /// Aggregate numbers over a batch.
    ComputeStats {
        run_id:    RunId,
        snapshots: Vec<Snapshot>,
    },
    /// Diff one snapshot against the previous-position memo.
    DetectMovement {
        run_id:   RunId,
        snapshot: Snapshot,
    },
    /// Wipe the previous-position memo. Sent on start and clear.
    ClearCache,
}

impl OffloadRequest {
    pub fn kind(&self) -> OffloadKind {
        match self {
            OffloadRequest::ProcessBatch { .. } => OffloadKind::ProcessBatch,
            OffloadRequest::ComputeStats { .. } => OffloadKind::ComputeStats,
            OffloadRequest::DetectMovement { .. } => OffloadKind::DetectMovement,
            OffloadRequest::ClearCache => OffloadKind::ClearCache,
        }
    }
}

#[derive(Debug)]
pub enum OffloadResponse {
    BatchProcessed {
        run_id: RunId,
        items:  Vec<QueuedSnapshot>,
    },
    StatsComputed {
        run_id: RunId,
        stats:  BatchStats,
    },
    MovementDetected {
        run_id: RunId,
        tag:    MovementTag,
    },
    CacheCleared,
}

impl OffloadResponse {
    pub fn kind(&self) -> OffloadKind {
        match self {
            OffloadResponse::BatchProcessed { .. } => OffloadKind::ProcessBatch,
            OffloadResponse::StatsComputed { .. } => OffloadKind::ComputeStats,
            OffloadResponse::MovementDetected { .. } => OffloadKind::DetectMovement,
            OffloadResponse::CacheCleared => OffloadKind::ClearCache,
        }
    }
}

enum WorkerCommand {
    Request(OffloadRequest),
    Shutdown,
}

/// The actual work, shared by both modes so their numbers agree.
fn execute(cache: &mut MovementCache, request: OffloadRequest) -> OffloadResponse {
    match request {
        OffloadRequest::ProcessBatch { run_id, snapshots } => {
            let items = analytics::process_batch(cache, &run_id, snapshots);
            OffloadResponse::BatchProcessed { run_id, items }
        }
        OffloadRequest::ComputeStats { run_id, snapshots } => OffloadResponse::StatsComputed {
            stats: analytics::batch_stats(&snapshots),
            run_id,
        },
        OffloadRequest::DetectMovement { run_id, snapshot } => {
            let tag = analytics::detect_movement_cached(cache, &run_id, &snapshot);
            OffloadResponse::MovementDetected { run_id, tag }
        }
        OffloadRequest::ClearCache => {
            cache.reset();
            log::debug!("movement cache cleared");
            OffloadResponse::CacheCleared
        }
    }
}

fn worker_loop(commands: Receiver<WorkerCommand>, responses: Sender<OffloadResponse>) {
    let mut cache = MovementCache::new();
    log::debug!("offload worker up");
    while let Ok(command) = commands.recv() {
        match command {
            WorkerCommand::Request(request) => {
                let response = execute(&mut cache, request);
                if responses.send(response).is_err() {
                    break; // nobody left to collect
                }
            }
            WorkerCommand::Shutdown => break,
        }
    }
    log::debug!("offload worker down");
}

enum Mode {
    Worker {
        commands:  Sender<WorkerCommand>,
        responses: Receiver<OffloadResponse>,
        handle:    Option<JoinHandle<()>>,
    },
    Sync {
        cache: MovementCache,
        ready: VecDeque<OffloadResponse>,
    },
}

pub struct OffloadChannel {
    mode:      Mode,
    in_flight: HashSet<OffloadKind>,
}

impl OffloadChannel {
    /// Spawns the background worker. Falls back to synchronous mode if
    /// the thread cannot be spawned.
    pub fn with_worker() -> Self {
        let (cmd_tx, cmd_rx) = unbounded::<WorkerCommand>();
        let (resp_tx, resp_rx) = unbounded::<OffloadResponse>();
        let spawned = thread::Builder::new()
            .name("offload-worker".into())
            .spawn(move || worker_loop(cmd_rx, resp_tx));
        match spawned {
            Ok(handle) => Self {
                mode:      Mode::Worker {
                    commands:  cmd_tx,
                    responses: resp_rx,
                    handle:    Some(handle),
                },
                in_flight: HashSet::new(),
            },
            Err(err) => {
                log::warn!("could not spawn offload worker ({err}); running analytics inline");
                Self::synchronous()
            }
        }
    }

    /// Single-threaded mode for hosts that forbid background threads.
    pub fn synchronous() -> Self {
        Self {
            mode:      Mode::Sync {
                cache: MovementCache::new(),
                ready: VecDeque::new(),
            },
            in_flight: HashSet::new(),
        }
    }

    pub fn is_synchronous(&self) -> bool {
        matches!(self.mode, Mode::Sync { .. })
    }

    pub fn is_busy(&self, kind: OffloadKind) -> bool {
        self.in_flight.contains(&kind)
    }

    /// Submits a request. Rejects with `OffloadBusy` while an earlier
    /// request of the same kind has not come back through `poll`.
    pub fn send(&mut self, request: OffloadRequest) -> PlaybackResult<()> {
        let kind = request.kind();
        if self.in_flight.contains(&kind) {
            return Err(PlaybackError::OffloadBusy { kind });
        }
        let recovered = match &mut self.mode {
            Mode::Worker { commands, .. } => match commands.send(WorkerCommand::Request(request)) {
                Ok(()) => {
                    self.in_flight.insert(kind);
                    return Ok(());
                }
                Err(err) => match err.into_inner() {
                    WorkerCommand::Request(request) => request,
                    WorkerCommand::Shutdown => return Err(PlaybackError::WorkerUnavailable),
                },
            },
            Mode::Sync { cache, ready } => {
                ready.push_back(execute(cache, request));
                self.in_flight.insert(kind);
                return Ok(());
            }
        };
        // The worker hung up mid-send. Flip modes, then run the
        // recovered request in place so the caller never notices.
        log::warn!("offload worker lost; degrading to synchronous analytics");
        self.degrade();
        if let Mode::Sync { cache, ready } = &mut self.mode {
            ready.push_back(execute(cache, recovered));
        }
        self.in_flight.insert(kind);
        Ok(())
    }

    /// Collects every finished response without blocking. Call once per
    /// tick before driving the scheduler.
    pub fn poll(&mut self) -> Vec<OffloadResponse> {
        let mut out = Vec::new();
        let mut lost_worker = false;
        match &mut self.mode {
            Mode::Worker { responses, .. } => loop {
                match responses.try_recv() {
                    Ok(response) => out.push(response),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        lost_worker = true;
                        break;
                    }
                }
            },
            Mode::Sync { ready, .. } => out.extend(ready.drain(..)),
        }
        for response in &out {
            self.in_flight.remove(&response.kind());
        }
        if lost_worker {
            log::warn!("offload worker lost; degrading to synchronous analytics");
            self.degrade();
            // Whatever was still in flight died with the worker.
            self.in_flight.clear();
        }
        out
    }

    /// Joins the dead worker (it has already exited when this is
    /// reached) and installs a fresh synchronous state. The old memo is
    /// unrecoverable; the next movement pass starts conservative.
    fn degrade(&mut self) {
        if let Mode::Worker { handle, .. } = &mut self.mode {
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
        self.mode = Mode::Sync {
            cache: MovementCache::new(),
            ready: VecDeque::new(),
        };
    }
}

impl Drop for OffloadChannel {
    fn drop(&mut self) {
        if let Mode::Worker { commands, handle, .. } = &mut self.mode {
            let _ = commands.send(WorkerCommand::Shutdown);
            if let Some(handle) = handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl std::fmt::Debug for OffloadChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OffloadChannel")
            .field("mode", &if self.is_synchronous() { "sync" } else { "worker" })
            .field("in_flight", &self.in_flight)
            .finish()
    }
}
