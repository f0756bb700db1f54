//! End-of-run summary.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

use super::types::{RepoStatus, Session};

/// Coarse classification of a repository failure, used to print a
/// remediation hint next to the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureHint {
    /// The target path exists but is not a git checkout.
    ExistingDirectory,
    Authentication,
    NotFound,
    Network,
    RemoteMisconfigured,
    Permission,
    MergeConflict,
    Other,
}

impl FailureHint {
    /// Classify an error message as recorded on a repository's state.
    pub fn classify(error: &str) -> Self {
        let e = error.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| e.contains(n));

        if has(&["already exists and is not an empty", "not a git repository"]) {
            Self::ExistingDirectory
        } else if has(&["authentication", "could not read username", "401", "403", "access denied"]) {
            Self::Authentication
        } else if has(&["not found", "404", "does not exist"]) {
            Self::NotFound
        } else if has(&["merge conflict", "conflict (", "not possible to fast-forward", "divergent branches"]) {
            Self::MergeConflict
        } else if has(&["timed out", "timeout", "connection", "could not resolve host", "network"]) {
            Self::Network
        } else if has(&["does not appear to be a git repository", "no such remote", "origin/"]) {
            Self::RemoteMisconfigured
        } else if has(&["permission denied", "read-only file system", "no space left"]) {
            Self::Permission
        } else {
            Self::Other
        }
    }

    pub fn remediation(self) -> &'static str {
        match self {
            Self::ExistingDirectory => {
                "Move or remove the existing directory, or point --target elsewhere"
            }
            Self::Authentication => {
                "Check that your token is set and has read access to this repository"
            }
            Self::NotFound => "The repository may have been renamed, deleted or made private",
            Self::Network => "Check your network connection and resume the session",
            Self::RemoteMisconfigured => {
                "Inspect the local checkout's `origin` remote and default branch"
            }
            Self::Permission => "Check file permissions and free disk space under the target",
            Self::MergeConflict => {
                "Resolve the conflict locally, or re-run with --strategy reset or fetch"
            }
            Self::Other => "Re-run with RUST_LOG=synclone=debug for details",
        }
    }
}

impl fmt::Display for FailureHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.remediation())
    }
}

/// A repository that ended the run as `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub full_name: String,
    pub error: String,
    pub attempts: u32,
    pub hint: FailureHint,
}

/// Counts and failures at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub session_id: Uuid,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Repositories left unprocessed (non-zero only after cancellation).
    pub pending: usize,
    pub failures: Vec<FailureRecord>,
    pub cancelled: bool,
    pub elapsed: Duration,
    /// Local checkouts removed because the organization no longer lists them.
    pub orphans_removed: Vec<PathBuf>,
}

impl SyncReport {
    pub fn from_session(session: &Session, cancelled: bool, elapsed: Duration) -> Self {
        let counts = session.counts();
        let failures = session
            .repositories
            .values()
            .filter(|s| s.status == RepoStatus::Failed)
            .map(|s| {
                let error = s.last_error.clone().unwrap_or_default();
                FailureRecord {
                    full_name: s.full_name.clone(),
                    hint: FailureHint::classify(&error),
                    error,
                    attempts: s.attempts,
                }
            })
            .collect();

        Self {
            session_id: session.id,
            completed: counts.completed,
            failed: counts.failed,
            skipped: counts.skipped,
            pending: counts.pending + counts.in_progress,
            failures,
            cancelled,
            elapsed,
            orphans_removed: Vec::new(),
        }
    }

    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped + self.pending
    }

    #[inline]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{ProviderKind, RepositoryDescriptor};
    use crate::sync::SyncRequest;

    fn descriptor(name: &str) -> RepositoryDescriptor {
        RepositoryDescriptor {
            provider: ProviderKind::GitLab,
            organization: "acme".into(),
            name: name.into(),
            full_name: format!("acme/{name}"),
            clone_url: format!("https://gitlab.com/acme/{name}.git"),
            private: true,
            archived: false,
            default_branch: "main".into(),
            language: None,
            updated_at: None,
        }
    }

    #[test]
    fn test_classify_common_git_errors() {
        let cases = [
            (
                "fatal: destination path 'x' already exists and is not an empty directory.",
                FailureHint::ExistingDirectory,
            ),
            (
                "fatal: Authentication failed for 'https://github.com/acme/x.git/'",
                FailureHint::Authentication,
            ),
            (
                "fatal: could not read Username for 'https://github.com': terminal prompts disabled",
                FailureHint::Authentication,
            ),
            ("remote: Repository not found.", FailureHint::NotFound),
            (
                "fatal: unable to access: Could not resolve host: github.com",
                FailureHint::Network,
            ),
            ("git operation timed out after 600s", FailureHint::Network),
            (
                "fatal: ambiguous argument 'origin/trunk': unknown revision",
                FailureHint::RemoteMisconfigured,
            ),
            (
                "error: could not lock config file: Permission denied",
                FailureHint::Permission,
            ),
            (
                "CONFLICT (content): Merge conflict in src/lib.rs",
                FailureHint::MergeConflict,
            ),
            ("something odd happened", FailureHint::Other),
        ];
        for (message, expected) in cases {
            assert_eq!(FailureHint::classify(message), expected, "{message}");
        }
    }

    #[test]
    fn test_report_from_session() {
        let mut session = Session::new(SyncRequest::new(ProviderKind::GitLab, "acme", "/tmp/acme"));
        let (ok, bad, skip, todo) = (
            descriptor("ok"),
            descriptor("bad"),
            descriptor("skip"),
            descriptor("todo"),
        );
        for d in [&ok, &bad, &skip, &todo] {
            session.register(d);
        }
        session.mark_in_progress(&ok);
        session.mark_completed(&ok, 10);
        for _ in 0..3 {
            session.mark_in_progress(&bad);
        }
        session.mark_failed(&bad, "remote: HTTP Basic: Access denied".into());
        session.mark_skipped(&skip, "archived".into());

        let report = SyncReport::from_session(&session, true, Duration::from_secs(2));
        assert_eq!(report.completed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.pending, 1);
        assert_eq!(report.total(), 4);
        assert!(report.cancelled);
        assert!(report.has_failures());

        let failure = &report.failures[0];
        assert_eq!(failure.full_name, "acme/bad");
        assert_eq!(failure.attempts, 3);
        assert_eq!(failure.hint, FailureHint::Authentication);
    }
}
