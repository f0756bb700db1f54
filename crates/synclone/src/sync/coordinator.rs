//! Top-level entry point: start, resume and cancel sessions.
//!
//! The coordinator wires a provider client, the repository stream, the
//! dispatcher and the checkpoint store together for one session and hands
//! the caller a [`SyncRun`]: the initial session snapshot, the progress event
//! receiver, and a handle that resolves to the final [`SyncReport`].

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::checkpoint::{CheckpointError, CheckpointStore};
use super::error::SyncError;
use super::executor::{GitRunner, StrategyExecutor};
use super::filter::RepoFilter;
use super::orphans;
use super::progress::{ProgressEvent, ProgressReceiver, ProgressSender, emit};
use super::report::SyncReport;
use super::scheduler::{DispatchOutcome, EngineOptions, Scheduler};
use super::stream::RepositoryStream;
use super::types::{Session, SharedSession, SyncRequest, lock_session};
use crate::cancel::CancelToken;
use crate::platform::{ClientFactory, ProviderClient};

/// A session with a live task.
struct RunningSession {
    cancel: CancelToken,
    /// Turns `true` once the task has written its final checkpoint and
    /// stopped.
    stopped: watch::Receiver<bool>,
}

type RunningSessions = Arc<Mutex<HashMap<Uuid, RunningSession>>>;

/// A session that is being processed.
pub struct SyncRun {
    /// The session as it was when the run began.
    pub session: Session,
    /// Progress events, closed after the final event.
    pub events: ProgressReceiver,
    pub handle: SyncHandle,
}

/// Resolves to the run's report once it stops.
pub struct SyncHandle {
    session_id: Uuid,
    cancel: CancelToken,
    task: JoinHandle<Result<SyncReport, SyncError>>,
}

impl SyncHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Request cancellation. The run persists a final checkpoint and
    /// resolves with a report marked as cancelled.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Wait for the run to stop.
    ///
    /// `Ok` covers completion with per-repository failures and
    /// cancellation; `Err` is reserved for session-fatal conditions.
    pub async fn wait(self) -> Result<SyncReport, SyncError> {
        self.task
            .await
            .map_err(|e| SyncError::Internal(format!("session task failed: {e}")))?
    }
}

pub struct SyncCoordinator {
    store: CheckpointStore,
    clients: Arc<dyn ClientFactory>,
    git: Arc<dyn GitRunner>,
    options: EngineOptions,
    running: RunningSessions,
}

impl SyncCoordinator {
    pub fn new(
        store: CheckpointStore,
        clients: Arc<dyn ClientFactory>,
        git: Arc<dyn GitRunner>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            clients,
            git,
            options,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn running(&self) -> MutexGuard<'_, HashMap<Uuid, RunningSession>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.running().contains_key(&session_id)
    }

    /// Begin a new session, or continue the one named by
    /// `request.resume_session_id`.
    ///
    /// Fails with [`SyncError::ActiveSessionExists`] when an unfinished
    /// session already targets the same provider, organization and directory.
    #[tracing::instrument(skip_all, fields(provider = %request.provider, org = %request.organization))]
    pub async fn start(&self, request: SyncRequest) -> Result<SyncRun, SyncError> {
        validate(&request)?;

        if let Some(id) = request.resume_session_id {
            return self.resume_with(id, Some(&request)).await;
        }

        let store = self.store.clone();
        let (provider, organization, target_dir) = (
            request.provider,
            request.organization.clone(),
            request.target_dir.clone(),
        );
        let active = blocking(move || store.find_active(provider, &organization, &target_dir)).await?;
        if let Some(active) = active {
            return Err(SyncError::ActiveSessionExists {
                session_id: active.id,
            });
        }

        // Everything that can refuse the run happens before the session is
        // written; a saved session is one that can be resumed.
        let session = Session::new(request);
        let (filter, client) = self.connect(&session.request)?;

        let store = self.store.clone();
        let initial = session.clone();
        blocking(move || store.save(&initial)).await?;
        tracing::info!(session = %session.id, "Session created");

        self.launch(session, filter, client, false)
    }

    /// Continue a saved session.
    pub async fn resume(&self, session_id: Uuid) -> Result<SyncRun, SyncError> {
        self.resume_with(session_id, None).await
    }

    async fn resume_with(
        &self,
        session_id: Uuid,
        requested: Option<&SyncRequest>,
    ) -> Result<SyncRun, SyncError> {
        if self.is_running(session_id) {
            return Err(SyncError::AlreadyRunning(session_id));
        }

        let store = self.store.clone();
        let mut session = blocking(move || store.load(session_id)).await?;

        if let Some(requested) = requested {
            adopt_request(&mut session, requested)?;
        }
        let (filter, client) = self.connect(&session.request)?;
        tracing::info!(
            session = %session_id,
            known = session.repositories.len(),
            "Resuming session"
        );

        self.launch(session, filter, client, true)
    }

    /// Cancel a running session.
    ///
    /// Returns once in-flight operations have drained and the final
    /// checkpoint is on disk.
    pub async fn cancel(&self, session_id: Uuid) -> Result<(), SyncError> {
        let entry = self
            .running()
            .get(&session_id)
            .map(|s| (s.cancel.clone(), s.stopped.clone()));
        let Some((cancel, mut stopped)) = entry else {
            return Err(SyncError::SessionNotRunning(session_id));
        };

        tracing::info!(session = %session_id, "Cancelling session");
        cancel.cancel();
        // The sender is dropped with the task, which also ends the wait.
        let _ = stopped.wait_for(|stopped| *stopped).await;
        Ok(())
    }

    /// Compile the filter and build the provider client for a request.
    fn connect(
        &self,
        request: &SyncRequest,
    ) -> Result<(RepoFilter, Arc<dyn ProviderClient>), SyncError> {
        let filter = RepoFilter::from_request(request)
            .map_err(|e| SyncError::invalid(format!("invalid pattern: {e}")))?;
        let client = self.clients.create(request.provider, request.host.as_deref())?;
        Ok((filter, client))
    }

    fn launch(
        &self,
        session: Session,
        filter: RepoFilter,
        client: Arc<dyn ProviderClient>,
        resumed: bool,
    ) -> Result<SyncRun, SyncError> {
        let session_id = session.id;
        let cancel = CancelToken::new();
        let (stopped_tx, stopped) = watch::channel(false);
        {
            let mut running = self.running();
            if running.contains_key(&session_id) {
                return Err(SyncError::AlreadyRunning(session_id));
            }
            running.insert(
                session_id,
                RunningSession {
                    cancel: cancel.clone(),
                    stopped,
                },
            );
        }

        let (events, receiver) = mpsc::unbounded_channel();
        emit(
            &events,
            ProgressEvent::Started {
                session_id,
                organization: session.request.organization.clone(),
                resumed,
                parallelism: session.request.parallelism,
            },
        );

        let snapshot = session.clone();
        let job = SessionJob {
            session: Arc::new(Mutex::new(session)),
            client,
            store: self.store.clone(),
            executor: StrategyExecutor::new(Arc::clone(&self.git), self.options.operation_timeout),
            filter,
            options: self.options.clone(),
            events,
            cancel: cancel.clone(),
            _guard: RunningGuard {
                running: Arc::clone(&self.running),
                session_id,
                stopped: stopped_tx,
            },
        };

        Ok(SyncRun {
            session: snapshot,
            events: receiver,
            handle: SyncHandle {
                session_id,
                cancel,
                task: tokio::spawn(job.run()),
            },
        })
    }
}

/// Removes a session from the running set and wakes pending `cancel` calls
/// when its task ends, however it ends.
struct RunningGuard {
    running: RunningSessions,
    session_id: Uuid,
    stopped: watch::Sender<bool>,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.session_id);
        self.stopped.send_replace(true);
    }
}

struct SessionJob {
    session: SharedSession,
    client: Arc<dyn ProviderClient>,
    store: CheckpointStore,
    executor: StrategyExecutor,
    filter: RepoFilter,
    options: EngineOptions,
    events: ProgressSender,
    cancel: CancelToken,
    _guard: RunningGuard,
}

impl SessionJob {
    #[tracing::instrument(name = "session", skip_all, fields(id = %self._guard.session_id))]
    async fn run(self) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let (organization, parallelism, target_dir, strategy) = {
            let session = lock_session(&self.session);
            (
                session.request.organization.clone(),
                session.request.parallelism,
                session.request.target_dir.clone(),
                session.request.strategy,
            )
        };

        let (stream, stream_task) = RepositoryStream::spawn(
            Arc::clone(&self.client),
            organization,
            self.options.channel_capacity,
            Arc::clone(&self.session),
            self.events.clone(),
            self.cancel.clone(),
            self.options.page_retry.clone(),
        );

        let scheduler = Scheduler {
            session: Arc::clone(&self.session),
            store: self.store.clone(),
            executor: self.executor.clone(),
            filter: self.filter.clone(),
            events: self.events.clone(),
            cancel: self.cancel.clone(),
            retry: self.options.retry.clone(),
            checkpoint_interval: self.options.checkpoint_interval,
            parallelism,
            target_dir,
            strategy,
        };

        let outcome = scheduler.run(stream, stream_task).await;
        let elapsed = started.elapsed();

        let DispatchOutcome { cancelled, stream } = match outcome {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("Session failed: {e}");
                emit(
                    &self.events,
                    ProgressEvent::SessionFailed {
                        error: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        let (mut report, finished, id, cleanup_orphans) = {
            let session = lock_session(&self.session);
            (
                SyncReport::from_session(&session, cancelled, elapsed),
                session.is_finished(),
                session.id,
                session.request.cleanup_orphans,
            )
        };

        if cancelled {
            tracing::info!(
                completed = report.completed,
                pending = report.pending,
                "Session cancelled; resume with `synclone resume {id}`"
            );
            emit(&self.events, ProgressEvent::SessionCancelled { report: report.clone() });
            return Ok(report);
        }

        if finished && cleanup_orphans {
            report.orphans_removed = self.remove_orphans().await;
        }

        if finished {
            let store = self.store.clone();
            if let Err(e) = blocking(move || store.archive(id)).await {
                tracing::warn!("Failed to archive finished session: {e}");
            }
        } else {
            tracing::warn!("Session stopped with unfinished repositories; it stays resumable");
        }

        tracing::info!(
            completed = report.completed,
            failed = report.failed,
            skipped = report.skipped,
            pages = stream.map_or(0, |s| s.pages),
            orphans_removed = report.orphans_removed.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Session finished"
        );
        emit(&self.events, ProgressEvent::SessionCompleted { report: report.clone() });
        Ok(report)
    }

    /// Delete checkouts below the target that match no repository of the
    /// session. Only called once enumeration has completed.
    async fn remove_orphans(&self) -> Vec<PathBuf> {
        let (target_dir, keep) = {
            let session = lock_session(&self.session);
            (
                session.request.target_dir.clone(),
                orphans::expected_paths(&session),
            )
        };

        match orphans::remove_orphans(&target_dir, &keep).await {
            Ok(removed) => {
                for path in &removed {
                    emit(&self.events, ProgressEvent::OrphanRemoved { path: path.clone() });
                }
                removed
            }
            Err(e) => {
                tracing::warn!(dir = %target_dir.display(), "Orphan cleanup failed: {e}");
                Vec::new()
            }
        }
    }
}

fn validate(request: &SyncRequest) -> Result<(), SyncError> {
    if request.organization.trim().is_empty() {
        return Err(SyncError::invalid("organization must not be empty"));
    }
    if request.target_dir.as_os_str().is_empty() {
        return Err(SyncError::invalid("target directory must not be empty"));
    }
    if request.parallelism == 0 {
        return Err(SyncError::invalid("parallelism must be at least 1"));
    }
    RepoFilter::from_request(request)
        .map_err(|e| SyncError::invalid(format!("invalid pattern: {e}")))?;
    Ok(())
}

/// Check that a resume request targets the saved session, and adopt the
/// settings that may change between runs.
fn adopt_request(session: &mut Session, requested: &SyncRequest) -> Result<(), SyncError> {
    let saved = &session.request;
    let mismatch = |field: &'static str, saved: String, requested: String| SyncError::SessionMismatch {
        session_id: session.id,
        field,
        saved,
        requested,
    };

    if saved.provider != requested.provider {
        return Err(mismatch(
            "provider",
            saved.provider.to_string(),
            requested.provider.to_string(),
        ));
    }
    if saved.organization != requested.organization {
        return Err(mismatch(
            "organization",
            saved.organization.clone(),
            requested.organization.clone(),
        ));
    }
    if saved.target_dir != requested.target_dir {
        return Err(mismatch(
            "target directory",
            saved.target_dir.display().to_string(),
            requested.target_dir.display().to_string(),
        ));
    }

    if saved.strategy != requested.strategy || saved.parallelism != requested.parallelism {
        tracing::warn!(
            saved_strategy = %saved.strategy,
            strategy = %requested.strategy,
            saved_parallelism = saved.parallelism,
            parallelism = requested.parallelism,
            "Resuming with different strategy or parallelism"
        );
    }
    session.request.strategy = requested.strategy;
    session.request.parallelism = requested.parallelism;
    session.request.cleanup_orphans = requested.cleanup_orphans;
    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, SyncError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CheckpointError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::Internal(format!("checkpoint task failed: {e}")))?
        .map_err(SyncError::from)
}
