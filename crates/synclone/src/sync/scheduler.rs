//! Bounded worker pool fed by the repository stream.
//!
//! A single dispatcher task owns all scheduling state. It pulls from the
//! stream only while a worker slot is free, so the channel stays the one
//! place where backpressure builds up. Every repository that is queued,
//! running or waiting for a retry is tracked in `active`; a second delivery
//! of the same name is dropped, which keeps at most one worker per
//! repository.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::checkpoint::CheckpointStore;
use super::error::SyncError;
use super::executor::{Action, ExecutionOutcome, GitError, GitErrorKind, StrategyExecutor};
use super::filter::RepoFilter;
use super::progress::{ProgressEvent, ProgressSender, SkipReason, emit};
use super::stream::{RepositoryStream, StreamSummary};
use super::types::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_OPERATION_TIMEOUT,
    DEFAULT_PAGE_ATTEMPTS, RepoStatus, SharedSession, Strategy, lock_session,
};
use crate::cancel::CancelToken;
use crate::platform::RepositoryDescriptor;
use crate::retry::RetryPolicy;

/// Engine tuning that is not part of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Per-repository attempts and backoff.
    pub retry: RetryPolicy,
    /// Per-page attempts and backoff for transient enumeration failures.
    pub page_retry: RetryPolicy,
    /// Capacity of the stream-to-dispatcher channel.
    pub channel_capacity: usize,
    /// Timeout for one clone or update.
    pub operation_timeout: Duration,
    /// Interval between periodic checkpoints.
    pub checkpoint_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            page_retry: RetryPolicy::default().with_max_attempts(DEFAULT_PAGE_ATTEMPTS),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }
}

impl EngineOptions {
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry = self.retry.with_max_attempts(max_attempts);
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_page_retry(mut self, page_retry: RetryPolicy) -> Self {
        self.page_retry = page_retry;
        self
    }

    #[must_use]
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry.max_attempts
    }
}

/// How the dispatcher loop ended.
#[derive(Debug)]
pub(crate) struct DispatchOutcome {
    pub cancelled: bool,
    pub stream: Option<StreamSummary>,
}

struct WorkerResult {
    repo: RepositoryDescriptor,
    attempt: u32,
    elapsed: Duration,
    result: Result<ExecutionOutcome, GitError>,
}

pub(crate) struct Scheduler {
    pub session: SharedSession,
    pub store: CheckpointStore,
    pub executor: StrategyExecutor,
    pub filter: RepoFilter,
    pub events: ProgressSender,
    pub cancel: CancelToken,
    pub retry: RetryPolicy,
    pub checkpoint_interval: Duration,
    pub parallelism: usize,
    pub target_dir: PathBuf,
    pub strategy: Strategy,
}

/// Mutable state of one dispatcher run.
struct Dispatch {
    backlog: VecDeque<RepositoryDescriptor>,
    active: HashSet<String>,
    workers: JoinSet<WorkerResult>,
    retries: JoinSet<RepositoryDescriptor>,
    dirty: bool,
}

impl Scheduler {
    /// Run until the stream is exhausted and every repository is terminal,
    /// or until cancellation.
    ///
    /// Returns a session-fatal error when enumeration failed or the final
    /// checkpoint could not be written; in-flight work is still drained and
    /// recorded first.
    #[tracing::instrument(name = "dispatch", skip_all, fields(parallelism = self.parallelism))]
    pub async fn run(
        self,
        mut stream: RepositoryStream,
        mut stream_task: JoinHandle<Result<StreamSummary, SyncError>>,
    ) -> Result<DispatchOutcome, SyncError> {
        let parallelism = self.parallelism.max(1);
        let mut state = Dispatch {
            backlog: VecDeque::new(),
            active: HashSet::new(),
            workers: JoinSet::new(),
            retries: JoinSet::new(),
            dirty: false,
        };

        // Work left over from an earlier run goes first.
        let leftovers = {
            let mut session = lock_session(&self.session);
            let reset = session.prepare_for_resume();
            if reset > 0 {
                tracing::info!(reset, "Re-queueing repositories interrupted mid-operation");
                state.dirty = true;
            }
            session.pending_descriptors()
        };
        for repo in leftovers {
            self.admit(&mut state, repo);
        }

        let period = self.checkpoint_interval.max(Duration::from_millis(10));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut stream_open = true;
        let mut stream_result: Option<Result<StreamSummary, SyncError>> = None;
        let mut cancelled = false;

        loop {
            while state.workers.len() < parallelism {
                let Some(repo) = state.backlog.pop_front() else {
                    break;
                };
                self.start(&mut state, repo);
            }

            if !stream_open
                && state.backlog.is_empty()
                && state.workers.is_empty()
                && state.retries.is_empty()
            {
                break;
            }

            let can_pull = stream_open && state.workers.len() < parallelism;

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    cancelled = true;
                    break;
                }

                Some(joined) = state.workers.join_next() => match joined {
                    Ok(done) => self.finish(&mut state, done, false).await,
                    Err(e) => tracing::error!("Worker task failed: {e}"),
                },

                Some(joined) = state.retries.join_next() => {
                    if let Ok(repo) = joined {
                        state.backlog.push_back(repo);
                    }
                }

                next = stream.next(), if can_pull => match next {
                    Some(repo) => self.admit(&mut state, repo),
                    None => {
                        stream_open = false;
                        let result = join_stream(&mut stream_task).await;
                        if result.is_err() {
                            // Enumeration failed: stop scheduling, keep
                            // queued work pending for a later resume.
                            state.retries.abort_all();
                            state.backlog.clear();
                            stream_result = Some(result);
                            break;
                        }
                        stream_result = Some(result);
                    }
                },

                _ = ticker.tick() => {
                    if state.dirty {
                        self.checkpoint_best_effort(&mut state).await;
                    }
                }
            }
        }

        if cancelled {
            tracing::info!(
                running = state.workers.len(),
                "Cancellation requested, waiting for in-flight operations"
            );
            state.retries.abort_all();
            stream.close();
            if stream_result.is_none() {
                stream_task.abort();
                stream_result = match join_stream(&mut stream_task).await {
                    Err(SyncError::Internal(_)) => None,
                    other => Some(other),
                };
            }
        }

        // Let running operations finish or time out; no new work is started.
        while let Some(joined) = state.workers.join_next().await {
            match joined {
                Ok(done) => self.finish(&mut state, done, true).await,
                Err(e) => tracing::error!("Worker task failed: {e}"),
            }
        }

        self.checkpoint(&mut state).await?;

        let stream = match stream_result {
            Some(Ok(summary)) => Some(summary),
            Some(Err(e)) if !cancelled => return Err(e),
            _ => None,
        };
        Ok(DispatchOutcome { cancelled, stream })
    }

    /// Decide what to do with a descriptor coming from the stream or the
    /// resume backlog.
    fn admit(&self, state: &mut Dispatch, repo: RepositoryDescriptor) {
        if state.active.contains(&repo.full_name) {
            tracing::trace!(repo = %repo.full_name, "Already scheduled, dropping duplicate");
            return;
        }

        let status = lock_session(&self.session).status_of(&repo.full_name);
        let already = match status {
            Some(RepoStatus::Completed) => Some(SkipReason::AlreadyCompleted),
            Some(RepoStatus::Skipped) => Some(SkipReason::AlreadySkipped),
            Some(RepoStatus::Failed) => Some(SkipReason::AlreadyFailed),
            Some(RepoStatus::Pending | RepoStatus::InProgress) | None => None,
        };
        if let Some(reason) = already {
            emit(
                &self.events,
                ProgressEvent::RepoSkipped {
                    full_name: repo.full_name,
                    reason,
                },
            );
            return;
        }

        if let Some(reason) = self.filter.check(&repo) {
            lock_session(&self.session).mark_skipped(&repo, reason.to_string());
            state.dirty = true;
            tracing::debug!(repo = %repo.full_name, %reason, "Filtered");
            emit(
                &self.events,
                ProgressEvent::RepoSkipped {
                    full_name: repo.full_name,
                    reason: SkipReason::Filtered(reason),
                },
            );
            return;
        }

        state.active.insert(repo.full_name.clone());
        state.backlog.push_back(repo);
    }

    fn start(&self, state: &mut Dispatch, repo: RepositoryDescriptor) {
        let attempt = lock_session(&self.session).mark_in_progress(&repo);
        state.dirty = true;
        emit(
            &self.events,
            ProgressEvent::RepoStarted {
                full_name: repo.full_name.clone(),
                attempt,
            },
        );

        let executor = self.executor.clone();
        let target_dir = self.target_dir.clone();
        let strategy = self.strategy;
        state.workers.spawn(async move {
            let started = Instant::now();
            // Run the operation in its own task so a panic is reported
            // against this repository instead of being lost.
            let task_repo = repo.clone();
            let handle = tokio::spawn(async move {
                executor.execute(&task_repo, &target_dir, strategy).await
            });
            let result = handle.await.unwrap_or_else(|e| {
                Err(GitError::new(
                    GitErrorKind::Other,
                    format!("sync {}", repo.full_name),
                    format!("worker panicked: {e}"),
                ))
            });
            WorkerResult {
                repo,
                attempt,
                elapsed: started.elapsed(),
                result,
            }
        });
    }

    /// Record a worker's result. While draining after cancellation no
    /// retries are scheduled; repositories with attempts left stay pending.
    async fn finish(&self, state: &mut Dispatch, done: WorkerResult, draining: bool) {
        let WorkerResult {
            repo,
            attempt,
            elapsed,
            result,
        } = done;

        match result {
            Ok(outcome) => {
                lock_session(&self.session).mark_completed(&repo, outcome.bytes_transferred);
                state.active.remove(&repo.full_name);
                tracing::info!(
                    repo = %repo.full_name,
                    action = ?outcome.action,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Repository synced"
                );
                emit(
                    &self.events,
                    ProgressEvent::RepoCompleted {
                        full_name: repo.full_name,
                        cloned: outcome.action == Action::Cloned,
                        bytes_transferred: outcome.bytes_transferred,
                        elapsed,
                    },
                );
                self.checkpoint_best_effort(state).await;
            }
            Err(err) => {
                let message = err.to_string();
                let attempts_left = self.retry.allows_retry(attempt);
                let will_retry = attempts_left && !draining;

                if attempts_left {
                    lock_session(&self.session).mark_retry_pending(&repo, message.clone());
                } else {
                    lock_session(&self.session).mark_failed(&repo, message.clone());
                }

                if will_retry {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        repo = %repo.full_name,
                        attempt,
                        kind = %err.kind,
                        delay_ms = delay.as_millis() as u64,
                        "Repository failed, retrying: {}",
                        err.message
                    );
                    let retry_repo = repo.clone();
                    state.retries.spawn(async move {
                        tokio::time::sleep(delay).await;
                        retry_repo
                    });
                } else {
                    state.active.remove(&repo.full_name);
                    if !attempts_left {
                        tracing::error!(
                            repo = %repo.full_name,
                            attempts = attempt,
                            kind = %err.kind,
                            "Repository failed: {}",
                            err.message
                        );
                    }
                }

                emit(
                    &self.events,
                    ProgressEvent::RepoFailed {
                        full_name: repo.full_name,
                        error: message,
                        attempt,
                        will_retry,
                    },
                );

                if will_retry {
                    state.dirty = true;
                } else {
                    self.checkpoint_best_effort(state).await;
                }
            }
        }
    }

    /// Persist the session; a failure here is logged and retried on the
    /// next checkpoint.
    async fn checkpoint_best_effort(&self, state: &mut Dispatch) {
        if let Err(e) = self.checkpoint(state).await {
            tracing::warn!("Checkpoint failed, will retry: {e}");
        }
    }

    async fn checkpoint(&self, state: &mut Dispatch) -> Result<(), SyncError> {
        let (id, payload, counts) = {
            let mut session = lock_session(&self.session);
            session.last_checkpoint_at = Some(Utc::now());
            (
                session.id,
                CheckpointStore::encode(&session)?,
                session.counts(),
            )
        };

        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.write_encoded(id, &payload))
            .await
            .map_err(|e| SyncError::Internal(format!("checkpoint task failed: {e}")))??;

        state.dirty = false;
        emit(
            &self.events,
            ProgressEvent::Checkpointed {
                completed: counts.completed,
                total: counts.total(),
            },
        );
        Ok(())
    }
}

async fn join_stream(
    handle: &mut JoinHandle<Result<StreamSummary, SyncError>>,
) -> Result<StreamSummary, SyncError> {
    match handle.await {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(SyncError::Internal("enumeration aborted".into())),
        Err(e) => Err(SyncError::Internal(format!("enumeration task failed: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_options_defaults() {
        let options = EngineOptions::default();
        assert_eq!(options.max_attempts(), 3);
        assert_eq!(options.page_retry.max_attempts, DEFAULT_PAGE_ATTEMPTS);
        assert_eq!(options.channel_capacity, 256);
        assert_eq!(options.operation_timeout, Duration::from_secs(600));
        assert_eq!(options.checkpoint_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_engine_options_builders() {
        let options = EngineOptions::default()
            .with_max_attempts(5)
            .with_channel_capacity(0)
            .with_checkpoint_interval(Duration::from_secs(1));
        assert_eq!(options.max_attempts(), 5);
        assert_eq!(options.channel_capacity, 1);
        assert_eq!(options.checkpoint_interval, Duration::from_secs(1));
    }
}
