use thiserror::Error;
use uuid::Uuid;

use super::checkpoint::CheckpointError;
use crate::platform::PlatformError;

/// Session-fatal errors returned to the caller of the coordinator.
///
/// Per-repository failures never surface here; they are recorded on the
/// session and reported through progress events and the final report.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid sync request: {0}")]
    InvalidRequest(String),

    #[error(
        "an unfinished session {session_id} exists for this organization and target; \
         resume it with `synclone resume {session_id}`"
    )]
    ActiveSessionExists { session_id: Uuid },

    #[error("session {session_id} was created with {field} {saved:?}, not {requested:?}")]
    SessionMismatch {
        session_id: Uuid,
        field: &'static str,
        saved: String,
        requested: String,
    },

    #[error("session {0} is already running")]
    AlreadyRunning(Uuid),

    #[error("session {0} is not running")]
    SessionNotRunning(Uuid),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("failed to list repositories for {organization}: {source}")]
    Enumeration {
        organization: String,
        #[source]
        source: PlatformError,
    },

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }
}
