use crate::offload::OffloadKind;
use crate::session::RunStatus;
use crate::types::RunId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed snapshot: {reason}")]
    MalformedSnapshot { reason: String },

    #[error("Stale run: expected {expected:?}, got {actual}")]
    StaleRun {
        expected: Option<RunId>,
        actual: RunId,
    },

    #[error("Session is {status:?}; not accepting playback data")]
    InactiveSession { status: RunStatus },

    #[error("Offload request of kind {kind:?} already in flight")]
    OffloadBusy { kind: OffloadKind },

    #[error("Offload worker unavailable")]
    WorkerUnavailable,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type PlaybackResult<T> = Result<T, PlaybackError>;
