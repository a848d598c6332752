//! Snapshot queue — the only entry point for playback data.
//!
//! Producers append at whatever cadence the transport delivers; the
//! scheduler drains from the head on its own clock. The buffer is
//! unbounded: backpressure is the scheduler's catch-up policy, not a
//! capacity limit here.
//!
//! RULE: strict FIFO. Nothing reorders, drops, or duplicates entries
//! between enqueue and dequeue.

use crate::analytics::MovementTag;
use crate::snapshot::Snapshot;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A snapshot waiting to be played, with optional movement annotation
/// attached by the offload worker when the batch path produced it.
#[derive(Debug, Clone)]
pub struct QueuedSnapshot {
    pub snapshot: Snapshot,
    pub movement: Option<MovementTag>,
}

impl QueuedSnapshot {
    pub fn bare(snapshot: Snapshot) -> Self {
        Self {
            snapshot,
            movement: None,
        }
    }
}

/// Clonable handle to the shared FIFO buffer. Clones see the same
/// queue, so the transport thread can enqueue while the tick dequeues.
#[derive(Debug, Clone, Default)]
pub struct SnapshotQueue {
    inner: Arc<Mutex<VecDeque<QueuedSnapshot>>>,
}

impl SnapshotQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, item: QueuedSnapshot) {
        self.lock().push_back(item);
    }

    /// Appends a batch in one lock acquisition, preserving order.
    pub fn enqueue_all(&self, items: Vec<QueuedSnapshot>) {
        if items.is_empty() {
            return;
        }
        self.lock().extend(items);
    }

    pub fn dequeue(&self) -> Option<QueuedSnapshot> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discards everything buffered. Returns how many entries were
    /// dropped so callers can log the cancellation.
    pub fn clear(&self) -> usize {
        let mut buf = self.lock();
        let dropped = buf.len();
        buf.clear();
        dropped
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<QueuedSnapshot>> {
        // A poisoned lock means a panicking producer; the queue data
        // itself is still sound (every operation leaves it consistent).
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
