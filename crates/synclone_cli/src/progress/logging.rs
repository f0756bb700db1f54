use synclone::sync::ProgressEvent;

/// Logging reporter using tracing for structured output.
pub(crate) struct LoggingReporter;

impl LoggingReporter {
    pub(crate) fn new() -> Self {
        Self
    }

    pub(crate) fn handle(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::Started {
                session_id,
                organization,
                resumed,
                parallelism,
            } => {
                tracing::info!(
                    session = %session_id,
                    organization = %organization,
                    resumed,
                    parallelism,
                    "Sync started"
                );
            }

            ProgressEvent::PageFetched {
                page,
                count,
                total_so_far,
                has_more,
            } => {
                tracing::debug!(page, count, total_so_far, has_more, "Fetched page");
            }

            ProgressEvent::RateLimitWait { host, reset_at } => {
                tracing::warn!(host = %host, reset_at = %reset_at, "Rate limited, waiting for reset");
            }

            ProgressEvent::RepoStarted { full_name, attempt } => {
                tracing::debug!(repo = %full_name, attempt, "Syncing");
            }

            ProgressEvent::RepoCompleted {
                full_name,
                cloned,
                bytes_transferred,
                elapsed,
            } => {
                let action = if *cloned { "cloned" } else { "updated" };
                tracing::info!(
                    repo = %full_name,
                    action,
                    bytes = bytes_transferred,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Synced"
                );
            }

            ProgressEvent::RepoFailed {
                full_name,
                error,
                attempt,
                will_retry,
            } => {
                if *will_retry {
                    tracing::warn!(repo = %full_name, attempt, error = %error, "Failed, will retry");
                } else {
                    tracing::error!(repo = %full_name, attempt, error = %error, "Failed");
                }
            }

            ProgressEvent::RepoSkipped { full_name, reason } => {
                tracing::debug!(repo = %full_name, reason = %reason, "Skipped");
            }

            ProgressEvent::Checkpointed { completed, total } => {
                tracing::debug!(completed, total, "Checkpoint saved");
            }

            ProgressEvent::OrphanRemoved { path } => {
                tracing::info!(path = %path.display(), "Removed orphaned checkout");
            }

            ProgressEvent::SessionCompleted { report } => {
                tracing::info!(
                    completed = report.completed,
                    failed = report.failed,
                    skipped = report.skipped,
                    elapsed_s = report.elapsed.as_secs(),
                    "Sync complete"
                );
            }

            ProgressEvent::SessionCancelled { report } => {
                tracing::warn!(
                    session = %report.session_id,
                    completed = report.completed,
                    pending = report.pending,
                    "Sync cancelled"
                );
            }

            ProgressEvent::SessionFailed { error } => {
                tracing::error!(error = %error, "Sync failed");
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
