//! Progress events emitted by a running session.
//!
//! Events are the only channel between the engine and whatever renders it;
//! the engine never touches the terminal. The channel is unbounded so a slow
//! renderer can never stall workers.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::filter::FilterReason;
use super::report::SyncReport;

/// Why a repository was not dispatched to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Excluded by the request's filters.
    Filtered(FilterReason),
    /// Already completed in an earlier run of this session.
    AlreadyCompleted,
    AlreadySkipped,
    /// Exhausted its attempts in an earlier run of this session.
    AlreadyFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filtered(reason) => write!(f, "filtered: {reason}"),
            Self::AlreadyCompleted => f.write_str("already completed"),
            Self::AlreadySkipped => f.write_str("already skipped"),
            Self::AlreadyFailed => f.write_str("already failed"),
        }
    }
}

#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum ProgressEvent {
    /// The session began (or resumed) processing.
    Started {
        session_id: Uuid,
        organization: String,
        resumed: bool,
        parallelism: usize,
    },

    /// A page of repositories was enumerated and committed.
    PageFetched {
        page: usize,
        count: usize,
        total_so_far: usize,
        has_more: bool,
    },

    /// Enumeration is paused until the provider's quota resets.
    RateLimitWait {
        host: String,
        reset_at: DateTime<Utc>,
    },

    RepoStarted {
        full_name: String,
        attempt: u32,
    },

    RepoCompleted {
        full_name: String,
        /// `true` for a fresh clone, `false` for an update.
        cloned: bool,
        bytes_transferred: u64,
        elapsed: Duration,
    },

    RepoFailed {
        full_name: String,
        error: String,
        attempt: u32,
        /// Another attempt has been scheduled.
        will_retry: bool,
    },

    RepoSkipped {
        full_name: String,
        reason: SkipReason,
    },

    /// The session was written to the checkpoint store.
    Checkpointed {
        completed: usize,
        total: usize,
    },

    /// A checkout of a repository the organization no longer lists was
    /// deleted.
    OrphanRemoved {
        path: PathBuf,
    },

    SessionCompleted {
        report: SyncReport,
    },

    /// The run stopped on request; the session is resumable.
    SessionCancelled {
        report: SyncReport,
    },

    /// The run aborted with a session-fatal error.
    SessionFailed {
        error: String,
    },
}

impl ProgressEvent {
    /// Whether this is the last event a session emits.
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            Self::SessionCompleted { .. } | Self::SessionCancelled { .. } | Self::SessionFailed { .. }
        )
    }
}

/// Sending half of the event channel.
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receiving half of the event channel.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Send an event, ignoring a dropped receiver.
///
/// Callers may stop listening at any time; the run carries on regardless.
#[inline]
pub fn emit(events: &ProgressSender, event: ProgressEvent) {
    let _ = events.send(event);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_without_receiver_is_harmless() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        emit(
            &tx,
            ProgressEvent::RepoStarted {
                full_name: "acme/api".into(),
                attempt: 1,
            },
        );
    }

    #[test]
    fn test_final_events() {
        assert!(ProgressEvent::SessionFailed { error: "boom".into() }.is_final());
        assert!(
            !ProgressEvent::Checkpointed {
                completed: 1,
                total: 2
            }
            .is_final()
        );
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(
            SkipReason::Filtered(FilterReason::Archived).to_string(),
            "filtered: archived"
        );
        assert_eq!(SkipReason::AlreadyCompleted.to_string(), "already completed");
    }
}
