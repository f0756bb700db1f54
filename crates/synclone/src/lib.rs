//! Synclone - resumable bulk clone and update of hosted organizations.
//!
//! This library enumerates every repository of a GitHub organization, GitLab
//! group, or Gitea/Gogs organization and clones or updates each one into a
//! local directory, with per-host rate limiting, bounded parallelism,
//! retries, and checkpoints that let an interrupted run pick up where it
//! stopped.
//!
//! # Features
//!
//! - `github`, `gitlab`, `gitea` - Provider clients (all enabled by default).
//!   The `gitea` feature also covers Gogs.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use synclone::{CheckpointStore, EngineOptions, HttpClientFactory, ProviderKind};
//! use synclone::{SyncCoordinator, SyncRequest, SystemGit};
//!
//! let coordinator = SyncCoordinator::new(
//!     CheckpointStore::new("/var/lib/synclone/sessions"),
//!     Arc::new(HttpClientFactory::new()),
//!     Arc::new(SystemGit::new()),
//!     EngineOptions::default(),
//! );
//! let run = coordinator
//!     .start(SyncRequest::new(ProviderKind::Gitea, "forgejo", "./forgejo"))
//!     .await?;
//! let report = run.handle.wait().await?;
//! println!("{} completed, {} failed", report.completed, report.failed);
//! ```

pub mod cancel;
pub mod http;
pub mod platform;
pub mod retry;
pub mod sync;

#[cfg(feature = "github")]
pub mod github;

#[cfg(feature = "gitlab")]
pub mod gitlab;

#[cfg(feature = "gitea")]
pub mod gitea;

pub use cancel::CancelToken;
pub use platform::{
    ClientFactory, HttpClientFactory, PlatformError, ProviderClient, ProviderKind, RateLimiter,
    RepoPage, RepositoryDescriptor,
};
pub use sync::{
    CheckpointStore, EngineOptions, ProgressEvent, Session, Strategy, SyncCoordinator,
    SyncError, SyncReport, SyncRequest, SystemGit,
};
