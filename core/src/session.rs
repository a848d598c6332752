//! Run session — which run is on stage and in what state.
//!
//! Exactly one session exists at a time. Transition rules live in the
//! controller; this module is the data and the predicates.

use crate::types::RunId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run loaded. The state after construction and after `clear`.
    Idle,
    Running,
    Paused,
    /// Stream exhausted or explicitly ended. Buffered data is kept but
    /// never played; only a new `start` or `clear` leaves this state.
    Ended,
}

impl RunStatus {
    /// Active sessions accept playback data.
    pub fn is_active(self) -> bool {
        matches!(self, RunStatus::Running | RunStatus::Paused)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSession {
    pub run_id:     Option<RunId>,
    pub status:     RunStatus,
    pub started_at: Option<DateTime<Utc>>,
}

impl Default for RunSession {
    fn default() -> Self {
        Self {
            run_id:     None,
            status:     RunStatus::Idle,
            started_at: None,
        }
    }
}

impl RunSession {
    pub fn idle() -> Self {
        Self::default()
    }

    /// Replaces whatever was on stage with a fresh running session.
    pub fn begin(&mut self, run_id: RunId) {
        self.run_id = Some(run_id);
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    pub fn matches(&self, run_id: &RunId) -> bool {
        self.run_id.as_deref() == Some(run_id.as_str())
    }
}
