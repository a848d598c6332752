//! Rendering seam — the one trait the host implements.
//!
//! The scheduler produces [`RenderFrame`]s; what a repaint physically
//! does (canvas paint, GPU pass, terminal redraw) is entirely the
//! host's business. The crate ships two stand-ins: a recording sink
//! for tests and the harness, and a null sink for headless runs.

use crate::dirty::RepaintScope;
use crate::snapshot::EntityState;
use crate::types::{EntityId, Time};
use crate::viewport::ViewportState;
use std::collections::BTreeMap;

/// Everything a host needs to paint one frame.
#[derive(Debug)]
pub struct RenderFrame<'a> {
    /// How much of the surface to cover.
    pub scope:    RepaintScope,
    /// The world as of the displayed snapshot.
    pub entities: &'a BTreeMap<EntityId, EntityState>,
    /// Simulation time of the displayed snapshot.
    pub time:     Time,
    pub viewport: ViewportState,
    /// Final frame of the run; hosts draw their end-of-run overlay.
    pub terminal: bool,
}

pub trait RenderSink {
    fn repaint(&mut self, frame: RenderFrame<'_>);
}

/// Owned copy of a delivered frame, for assertions after the fact.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub scope:    RepaintScope,
    pub entities: BTreeMap<EntityId, EntityState>,
    pub time:     Time,
    pub viewport: ViewportState,
    pub terminal: bool,
}

/// Sink that remembers every frame it was handed.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub frames: Vec<FrameRecord>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }

    pub fn repaint_count(&self) -> usize {
        self.frames.len()
    }
}

impl RenderSink for RecordingSink {
    fn repaint(&mut self, frame: RenderFrame<'_>) {
        self.frames.push(FrameRecord {
            scope:    frame.scope,
            entities: frame.entities.clone(),
            time:     frame.time,
            viewport: frame.viewport,
            terminal: frame.terminal,
        });
    }
}

/// Sink that discards everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn repaint(&mut self, _frame: RenderFrame<'_>) {}
}
