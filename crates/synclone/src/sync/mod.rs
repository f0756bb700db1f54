//! Resumable bulk synchronization of an organization's repositories.
//!
//! # Module Structure
//!
//! - [`types`] - Requests, sessions, per-repository state, constants
//! - [`filter`] - Name/visibility/archived filtering
//! - [`stream`] - Paginated enumeration with bounded backpressure
//! - [`executor`] - Git invocation for clone and the update strategies
//! - [`scheduler`] - Worker pool, retries and checkpoint cadence
//! - [`checkpoint`] - Atomic on-disk session persistence
//! - [`orphans`] - Removal of checkouts no longer listed upstream
//! - [`coordinator`] - Start, resume and cancel
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use synclone::platform::{HttpClientFactory, ProviderKind};
//! use synclone::sync::{CheckpointStore, EngineOptions, SyncCoordinator, SyncRequest, SystemGit};
//!
//! let coordinator = SyncCoordinator::new(
//!     CheckpointStore::new(state_dir),
//!     Arc::new(HttpClientFactory::new().with_token(ProviderKind::GitHub, token)),
//!     Arc::new(SystemGit::new()),
//!     EngineOptions::default(),
//! );
//! let mut run = coordinator
//!     .start(SyncRequest::new(ProviderKind::GitHub, "rust-lang", "/srv/rust-lang"))
//!     .await?;
//! while let Some(event) = run.events.recv().await {
//!     println!("{event:?}");
//! }
//! let report = run.handle.wait().await?;
//! ```

pub mod checkpoint;
pub mod coordinator;
mod error;
pub mod executor;
pub mod filter;
pub mod orphans;
mod progress;
mod report;
pub mod scheduler;
pub mod stream;
mod types;

pub use checkpoint::{CHECKPOINT_VERSION, CheckpointError, CheckpointStore, SessionSummary};
pub use coordinator::{SyncCoordinator, SyncHandle, SyncRun};
pub use error::SyncError;
pub use executor::{
    Action, ExecutionOutcome, GitError, GitErrorKind, GitOutput, GitRunner, LocalState,
    StrategyExecutor, SystemGit,
};
pub use filter::{FilterReason, RepoFilter};
pub use progress::{ProgressEvent, ProgressReceiver, ProgressSender, SkipReason, emit};
pub use report::{FailureHint, FailureRecord, SyncReport};
pub use scheduler::EngineOptions;
pub use stream::{RepositoryStream, StreamSummary};
pub use types::{
    RepoState, RepoStatus, Session, SharedSession, StatusCounts, Strategy, SyncRequest,
    Visibility,
};

pub use types::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_CHECKPOINT_INTERVAL, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_OPERATION_TIMEOUT, DEFAULT_PAGE_ATTEMPTS, DEFAULT_PARALLELISM, INITIAL_BACKOFF_MS,
    MAX_BACKOFF_MS,
};
