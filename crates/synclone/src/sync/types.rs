//! Session data model and shared constants.
//!
//! A [`Session`] is the unit of resumability: it holds the request, the
//! enumeration cursor, and one [`RepoState`] per discovered repository.
//! All status changes go through the transition methods on `Session` so the
//! persisted form is always the single source of truth.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::platform::{ProviderKind, RepositoryDescriptor};

/// Default number of concurrent clone/update workers.
pub const DEFAULT_PARALLELISM: usize = 10;

/// Default attempts per repository, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default attempts per enumeration page before the session is abandoned.
pub const DEFAULT_PAGE_ATTEMPTS: u32 = 5;

/// Default capacity of the stream-to-scheduler channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for a single clone or update.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Default interval between periodic checkpoints.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Local update policy for repositories that already exist on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Discard local changes and align with the remote default branch.
    #[default]
    Reset,
    /// Merge-pull, keeping local commits.
    Pull,
    /// Update remote refs only.
    Fetch,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reset => "reset",
            Self::Pull => "pull",
            Self::Fetch => "fetch",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reset" => Ok(Self::Reset),
            "pull" => Ok(Self::Pull),
            "fetch" => Ok(Self::Fetch),
            other => Err(format!(
                "invalid strategy: {other} (expected reset, pull, or fetch)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    All,
    Public,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Public => "public",
            Self::Private => "private",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "public" => Ok(Self::Public),
            "private" => Ok(Self::Private),
            other => Err(format!("invalid visibility: {other}")),
        }
    }
}

/// Caller-supplied configuration for one run.
///
/// Patterns are kept as source strings so the request can be persisted; they
/// are compiled into a [`RepoFilter`](super::RepoFilter) when a run starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub provider: ProviderKind,
    /// Provider host; `None` uses the factory's configured or default host.
    #[serde(default)]
    pub host: Option<String>,
    pub organization: String,
    pub target_dir: PathBuf,
    #[serde(default)]
    pub strategy: Strategy,
    pub parallelism: usize,
    #[serde(default)]
    pub name_pattern: Option<String>,
    #[serde(default)]
    pub exclude_pattern: Option<String>,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub include_archived: bool,
    /// Remove local checkouts the organization no longer lists once a run
    /// finishes.
    #[serde(default)]
    pub cleanup_orphans: bool,
    /// Continue this session instead of creating a new one.
    #[serde(default, skip_serializing)]
    pub resume_session_id: Option<Uuid>,
}

impl SyncRequest {
    /// A request with defaults for everything but the essentials.
    pub fn new(
        provider: ProviderKind,
        organization: impl Into<String>,
        target_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            provider,
            host: None,
            organization: organization.into(),
            target_dir: target_dir.into(),
            strategy: Strategy::default(),
            parallelism: DEFAULT_PARALLELISM,
            name_pattern: None,
            exclude_pattern: None,
            visibility: Visibility::default(),
            include_archived: false,
            cleanup_orphans: false,
            resume_session_id: None,
        }
    }

    #[must_use]
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub fn with_name_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.name_pattern = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn with_exclude_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_pattern = Some(pattern.into());
        self
    }

    #[must_use]
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    #[must_use]
    pub fn with_cleanup_orphans(mut self, cleanup: bool) -> Self {
        self.cleanup_orphans = cleanup;
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    Pending,
    InProgress,
    Completed,
    /// Failed after exhausting its attempts. Repositories waiting for a retry
    /// stay `Pending` with `last_error` set.
    Failed,
    Skipped,
}

impl RepoStatus {
    #[inline]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing state of one repository within a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoState {
    pub full_name: String,
    /// Kept so a resumed session can dispatch repositories from pages the
    /// stream will not deliver again.
    pub descriptor: RepositoryDescriptor,
    pub status: RepoStatus,
    pub attempts: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bytes_transferred: u64,
}

impl RepoState {
    pub fn pending(descriptor: RepositoryDescriptor) -> Self {
        Self {
            full_name: descriptor.full_name.clone(),
            descriptor,
            status: RepoStatus::Pending,
            attempts: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
            bytes_transferred: 0,
        }
    }
}

/// Counts of repositories by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub in_progress: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn total(&self) -> usize {
        self.pending + self.in_progress + self.completed + self.failed + self.skipped
    }
}

/// The unit of resumability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub request: SyncRequest,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    /// Cursor of the next page to enumerate; `None` before the first page.
    #[serde(default)]
    pub stream_cursor: Option<String>,
    /// Set once the provider reported no further pages.
    #[serde(default)]
    pub enumeration_complete: bool,
    #[serde(default)]
    pub repositories: BTreeMap<String, RepoState>,
}

impl Session {
    pub fn new(mut request: SyncRequest) -> Self {
        request.resume_session_id = None;
        Self {
            id: Uuid::new_v4(),
            request,
            created_at: Utc::now(),
            last_checkpoint_at: None,
            stream_cursor: None,
            enumeration_complete: false,
            repositories: BTreeMap::new(),
        }
    }

    pub fn get(&self, full_name: &str) -> Option<&RepoState> {
        self.repositories.get(full_name)
    }

    pub fn status_of(&self, full_name: &str) -> Option<RepoStatus> {
        self.repositories.get(full_name).map(|s| s.status)
    }

    /// Record a freshly enumerated repository. Returns `false` when it was
    /// already known, in which case its state is left untouched.
    pub fn register(&mut self, descriptor: &RepositoryDescriptor) -> bool {
        if self.repositories.contains_key(&descriptor.full_name) {
            return false;
        }
        self.repositories.insert(
            descriptor.full_name.clone(),
            RepoState::pending(descriptor.clone()),
        );
        true
    }

    fn entry(&mut self, descriptor: &RepositoryDescriptor) -> &mut RepoState {
        self.repositories
            .entry(descriptor.full_name.clone())
            .or_insert_with(|| RepoState::pending(descriptor.clone()))
    }

    /// Mark a repository as taken by a worker. Returns the attempt number.
    pub fn mark_in_progress(&mut self, descriptor: &RepositoryDescriptor) -> u32 {
        let state = self.entry(descriptor);
        state.status = RepoStatus::InProgress;
        state.attempts += 1;
        state.started_at = Some(Utc::now());
        state.finished_at = None;
        state.attempts
    }

    pub fn mark_completed(&mut self, descriptor: &RepositoryDescriptor, bytes_transferred: u64) {
        let state = self.entry(descriptor);
        state.status = RepoStatus::Completed;
        state.last_error = None;
        state.finished_at = Some(Utc::now());
        state.bytes_transferred = bytes_transferred;
    }

    /// Record a failed attempt that will be retried later.
    pub fn mark_retry_pending(&mut self, descriptor: &RepositoryDescriptor, error: String) {
        let state = self.entry(descriptor);
        state.status = RepoStatus::Pending;
        state.last_error = Some(error);
        state.finished_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self, descriptor: &RepositoryDescriptor, error: String) {
        let state = self.entry(descriptor);
        state.status = RepoStatus::Failed;
        state.last_error = Some(error);
        state.finished_at = Some(Utc::now());
    }

    pub fn mark_skipped(&mut self, descriptor: &RepositoryDescriptor, reason: String) {
        let state = self.entry(descriptor);
        state.status = RepoStatus::Skipped;
        state.last_error = Some(reason);
        state.finished_at = Some(Utc::now());
    }

    /// Reset work interrupted by a crash so it is picked up again.
    pub fn prepare_for_resume(&mut self) -> usize {
        let mut reset = 0;
        for state in self.repositories.values_mut() {
            if state.status == RepoStatus::InProgress {
                state.status = RepoStatus::Pending;
                reset += 1;
            }
        }
        reset
    }

    /// Descriptors still waiting for a worker, in key order.
    pub fn pending_descriptors(&self) -> Vec<RepositoryDescriptor> {
        self.repositories
            .values()
            .filter(|s| s.status == RepoStatus::Pending)
            .map(|s| s.descriptor.clone())
            .collect()
    }

    pub fn counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for state in self.repositories.values() {
            match state.status {
                RepoStatus::Pending => counts.pending += 1,
                RepoStatus::InProgress => counts.in_progress += 1,
                RepoStatus::Completed => counts.completed += 1,
                RepoStatus::Failed => counts.failed += 1,
                RepoStatus::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Enumeration has ended and every repository is terminal.
    pub fn is_finished(&self) -> bool {
        self.enumeration_complete
            && self.repositories.values().all(|s| s.status.is_terminal())
    }

    /// Whether this session targets the same organization and directory.
    pub fn matches(&self, provider: ProviderKind, organization: &str, target_dir: &Path) -> bool {
        self.request.provider == provider
            && self.request.organization == organization
            && self.request.target_dir == target_dir
    }
}

/// A session shared between the stream and the dispatcher.
///
/// The lock is only ever held for a single transition or snapshot, never
/// across an await.
pub type SharedSession = Arc<Mutex<Session>>;

pub(crate) fn lock_session(session: &SharedSession) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(name: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            provider: ProviderKind::GitHub,
            organization: "acme".into(),
            name: name.into(),
            full_name: format!("acme/{name}"),
            clone_url: format!("https://github.com/acme/{name}.git"),
            private: false,
            archived: false,
            default_branch: "main".into(),
            language: None,
            updated_at: None,
        }
    }

    fn session() -> Session {
        Session::new(SyncRequest::new(ProviderKind::GitHub, "acme", "/tmp/acme"))
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("reset".parse::<Strategy>(), Ok(Strategy::Reset));
        assert_eq!("PULL".parse::<Strategy>(), Ok(Strategy::Pull));
        assert_eq!("fetch".parse::<Strategy>(), Ok(Strategy::Fetch));
        assert!("merge".parse::<Strategy>().is_err());
        assert_eq!(Strategy::default(), Strategy::Reset);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut s = session();
        let d = descriptor("api");
        assert!(s.register(&d));
        s.mark_in_progress(&d);
        assert!(!s.register(&d));
        assert_eq!(s.status_of("acme/api"), Some(RepoStatus::InProgress));
    }

    #[test]
    fn test_transitions_track_attempts_and_errors() {
        let mut s = session();
        let d = descriptor("api");
        s.register(&d);

        assert_eq!(s.mark_in_progress(&d), 1);
        s.mark_retry_pending(&d, "network".into());
        assert_eq!(s.status_of("acme/api"), Some(RepoStatus::Pending));

        assert_eq!(s.mark_in_progress(&d), 2);
        s.mark_completed(&d, 1024);
        let state = s.get("acme/api").expect("state");
        assert_eq!(state.status, RepoStatus::Completed);
        assert_eq!(state.attempts, 2);
        assert_eq!(state.bytes_transferred, 1024);
        assert!(state.last_error.is_none());
    }

    #[test]
    fn test_prepare_for_resume_resets_in_progress_only() {
        let mut s = session();
        let (a, b, c) = (descriptor("a"), descriptor("b"), descriptor("c"));
        for d in [&a, &b, &c] {
            s.register(d);
        }
        s.mark_in_progress(&a);
        s.mark_in_progress(&b);
        s.mark_completed(&b, 0);

        assert_eq!(s.prepare_for_resume(), 1);
        let pending: Vec<_> = s.pending_descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(pending, vec!["a", "c"]);
    }

    #[test]
    fn test_is_finished_requires_complete_enumeration() {
        let mut s = session();
        let d = descriptor("a");
        s.register(&d);
        s.mark_in_progress(&d);
        s.mark_failed(&d, "auth".into());
        assert!(!s.is_finished());

        s.enumeration_complete = true;
        assert!(s.is_finished());
        assert_eq!(s.counts().failed, 1);
        assert_eq!(s.counts().total(), 1);
    }

    #[test]
    fn test_resume_id_is_not_persisted() {
        let mut request = SyncRequest::new(ProviderKind::Gitea, "acme", "/srv/mirror");
        request.resume_session_id = Some(Uuid::new_v4());
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(!json.contains("resume_session_id"));

        let s = Session::new(request);
        assert!(s.request.resume_session_id.is_none());
        assert!(s.matches(ProviderKind::Gitea, "acme", Path::new("/srv/mirror")));
        assert!(!s.matches(ProviderKind::Gitea, "acme", Path::new("/srv/other")));
    }
}
