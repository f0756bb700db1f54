//! Clone-or-update for a single repository.
//!
//! The executor inspects the target path and either clones into it or applies
//! the session's [`Strategy`] to the existing checkout. Git itself is behind
//! the [`GitRunner`] trait; [`SystemGit`] shells out to the `git` binary.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use super::types::Strategy;
use crate::platform::RepositoryDescriptor;

/// Broad cause of a git failure, derived from its stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitErrorKind {
    Auth,
    NotFound,
    MergeConflict,
    DiskFull,
    Network,
    Timeout,
    /// The target path exists but is not a checkout.
    NotARepository,
    /// The git binary could not be started.
    Spawn,
    Other,
}

impl GitErrorKind {
    pub fn classify(stderr: &str) -> Self {
        let s = stderr.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| s.contains(n));

        if has(&["no space left on device", "disk quota exceeded"]) {
            Self::DiskFull
        } else if has(&[
            "authentication failed",
            "could not read username",
            "could not read password",
            "permission denied (publickey)",
            "access denied",
            "returned error: 401",
            "returned error: 403",
        ]) {
            Self::Auth
        } else if has(&["repository not found", "returned error: 404", "not found"]) {
            Self::NotFound
        } else if has(&[
            "conflict",
            "not possible to fast-forward",
            "divergent branches",
            "need to specify how to reconcile",
        ]) {
            Self::MergeConflict
        } else if has(&["not a git repository"]) {
            Self::NotARepository
        } else if has(&[
            "could not resolve host",
            "connection timed out",
            "connection reset",
            "connection refused",
            "failed to connect",
            "early eof",
            "the remote end hung up",
            "unable to access",
            "operation timed out",
        ]) {
            Self::Network
        } else {
            Self::Other
        }
    }
}

impl fmt::Display for GitErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auth => "authentication",
            Self::NotFound => "not found",
            Self::MergeConflict => "merge conflict",
            Self::DiskFull => "disk full",
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::NotARepository => "not a repository",
            Self::Spawn => "spawn",
            Self::Other => "git",
        })
    }
}

#[derive(Debug, Clone, Error)]
#[error("{command}: {message}")]
pub struct GitError {
    pub kind: GitErrorKind,
    /// The failing command line, for logs.
    pub command: String,
    /// Trimmed stderr, or a description when git never ran.
    pub message: String,
}

impl GitError {
    pub fn new(kind: GitErrorKind, command: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            command: command.into(),
            message: message.into(),
        }
    }

    /// Build an error from a failed command's stderr.
    pub fn from_stderr(command: impl Into<String>, stderr: &str) -> Self {
        let message = stderr.trim();
        let message = if message.is_empty() {
            "git exited with a non-zero status"
        } else {
            message
        };
        Self::new(GitErrorKind::classify(message), command, message)
    }
}

/// Captured output of a successful git command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs git commands.
///
/// Implementations must not prompt for credentials and must stop the child
/// process when the returned future is dropped.
#[async_trait]
pub trait GitRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> Result<GitOutput, GitError>;
}

/// The system `git` binary.
#[derive(Debug, Clone)]
pub struct SystemGit {
    program: PathBuf,
}

impl SystemGit {
    pub fn new() -> Self {
        Self {
            program: PathBuf::from("git"),
        }
    }

    /// Use a specific git executable.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SystemGit {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GitRunner for SystemGit {
    async fn run(&self, args: &[String]) -> Result<GitOutput, GitError> {
        let command = format!("git {}", args.join(" "));
        tracing::trace!(%command, "Running git");

        let output = tokio::process::Command::new(&self.program)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| GitError::new(GitErrorKind::Spawn, command.clone(), e.to_string()))?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(GitError::from_stderr(command, &stderr));
        }

        Ok(GitOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}

/// What the executor found at the target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Missing,
    /// An existing, empty directory; cloned into like a missing one.
    Empty,
    Repository,
    /// A non-empty directory without `.git`.
    Occupied,
}

impl LocalState {
    pub async fn detect(path: &Path) -> std::io::Result<Self> {
        match tokio::fs::metadata(path).await {
            Ok(meta) if !meta.is_dir() => return Ok(Self::Occupied),
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::Missing),
            Err(e) => return Err(e),
        }

        if tokio::fs::try_exists(path.join(".git")).await? {
            return Ok(Self::Repository);
        }

        let mut entries = tokio::fs::read_dir(path).await?;
        Ok(match entries.next_entry().await? {
            Some(_) => Self::Occupied,
            None => Self::Empty,
        })
    }

    #[inline]
    pub fn is_present(self) -> bool {
        matches!(self, Self::Repository | Self::Occupied)
    }
}

/// Local checkout path for a repository.
///
/// The organization prefix is stripped from the full name, so GitLab
/// subgroup projects keep their nested layout below the target directory.
/// Empty, `.` and `..` segments are dropped.
pub fn repo_path(target_dir: &Path, repo: &RepositoryDescriptor) -> PathBuf {
    let relative = strip_organization(&repo.full_name, &repo.organization).unwrap_or(&repo.full_name);

    let mut path = target_dir.to_path_buf();
    let mut pushed = false;
    for segment in relative.split('/') {
        if matches!(
            Path::new(segment).components().next(),
            Some(Component::Normal(_))
        ) && !segment.contains('\\')
        {
            path.push(segment);
            pushed = true;
        }
    }
    if !pushed {
        path.push(&repo.name);
    }
    path
}

/// `full_name` below `organization`, matching the organization without
/// regard to case the way hosting platforms do.
fn strip_organization<'a>(full_name: &'a str, organization: &str) -> Option<&'a str> {
    let organization = organization.trim_matches('/');
    let prefix = full_name.get(..organization.len())?;
    if !prefix.eq_ignore_ascii_case(organization) {
        return None;
    }
    full_name[organization.len()..].strip_prefix('/')
}

/// Bytes received according to git's `Receiving objects` progress line.
///
/// Small transfers finish without a size; those yield `None`.
pub fn parse_transfer_bytes(stderr: &str) -> Option<u64> {
    let line = stderr
        .split(['\r', '\n'])
        .rev()
        .find(|l| l.contains("Receiving objects:"))?;
    let size = line.split("), ").nth(1)?.split(['|', ',']).next()?.trim();
    let (amount, unit) = size.split_once(' ')?;
    let amount: f64 = amount.parse().ok()?;
    let multiplier = match unit.trim() {
        "bytes" | "byte" => 1.0,
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        _ => return None,
    };
    Some((amount * multiplier).round() as u64)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Cloned,
    Updated(Strategy),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub action: Action,
    pub path: PathBuf,
    pub bytes_transferred: u64,
}

/// Applies clone-or-update for one repository under a timeout.
#[derive(Clone)]
pub struct StrategyExecutor {
    runner: Arc<dyn GitRunner>,
    timeout: Duration,
}

impl StrategyExecutor {
    pub fn new(runner: Arc<dyn GitRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[tracing::instrument(skip_all, fields(repo = %repo.full_name, %strategy))]
    pub async fn execute(
        &self,
        repo: &RepositoryDescriptor,
        target_dir: &Path,
        strategy: Strategy,
    ) -> Result<ExecutionOutcome, GitError> {
        let path = repo_path(target_dir, repo);
        let state = LocalState::detect(&path).await.map_err(|e| {
            GitError::new(
                GitErrorKind::Other,
                format!("inspect {}", path.display()),
                e.to_string(),
            )
        })?;

        let result = match tokio::time::timeout(self.timeout, self.apply(repo, &path, state, strategy)).await {
            Ok(result) => result,
            Err(_) => Err(GitError::new(
                GitErrorKind::Timeout,
                format!("sync {}", repo.full_name),
                format!("git operation timed out after {}s", self.timeout.as_secs()),
            )),
        };

        // A failed or interrupted clone must not be mistaken for a checkout
        // on the next attempt.
        if result.is_err() && matches!(state, LocalState::Missing | LocalState::Empty) {
            discard_partial_clone(&path, state).await;
        }
        result
    }

    async fn apply(
        &self,
        repo: &RepositoryDescriptor,
        path: &Path,
        state: LocalState,
        strategy: Strategy,
    ) -> Result<ExecutionOutcome, GitError> {
        let dir = path.display().to_string();

        match state {
            LocalState::Missing | LocalState::Empty => {
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        GitError::new(
                            GitErrorKind::classify(&e.to_string()),
                            format!("mkdir {}", parent.display()),
                            e.to_string(),
                        )
                    })?;
                }
                let output = self
                    .git(["clone", "--progress", "--", &repo.clone_url, &dir])
                    .await?;
                tracing::debug!(path = %dir, "Cloned");
                Ok(ExecutionOutcome {
                    action: Action::Cloned,
                    path: path.to_path_buf(),
                    bytes_transferred: parse_transfer_bytes(&output.stderr).unwrap_or(0),
                })
            }
            LocalState::Occupied => Err(GitError::new(
                GitErrorKind::NotARepository,
                format!("clone {}", repo.full_name),
                format!("{dir} exists and is not a git repository"),
            )),
            LocalState::Repository => {
                let bytes = self.update(repo, &dir, strategy).await?;
                tracing::debug!(path = %dir, "Updated");
                Ok(ExecutionOutcome {
                    action: Action::Updated(strategy),
                    path: path.to_path_buf(),
                    bytes_transferred: bytes,
                })
            }
        }
    }

    async fn update(
        &self,
        repo: &RepositoryDescriptor,
        path: &str,
        strategy: Strategy,
    ) -> Result<u64, GitError> {
        let output = match strategy {
            Strategy::Reset => {
                let fetched = self.git(["-C", path, "fetch", "--prune", "origin"]).await?;
                let remote_branch = format!("origin/{}", repo.default_branch);
                self.git(["-C", path, "reset", "--hard", &remote_branch])
                    .await?;
                self.git(["-C", path, "clean", "-fd"]).await?;
                fetched
            }
            Strategy::Pull => self.git(["-C", path, "pull", "--no-rebase", "--ff"]).await?,
            Strategy::Fetch => self.git(["-C", path, "fetch", "--all", "--prune"]).await?,
        };
        Ok(parse_transfer_bytes(&output.stderr).unwrap_or(0))
    }

    async fn git<const N: usize>(&self, args: [&str; N]) -> Result<GitOutput, GitError> {
        let args: Vec<String> = args.iter().map(|a| (*a).to_string()).collect();
        self.runner.run(&args).await
    }
}

/// Remove whatever a failed clone left at `path`, restoring the state it
/// was cloned from.
async fn discard_partial_clone(path: &Path, state: LocalState) {
    // A timed-out child is killed on drop and may still be exiting.
    let mut removed = tokio::fs::remove_dir_all(path).await;
    if matches!(&removed, Err(e) if e.kind() != std::io::ErrorKind::NotFound) {
        tokio::time::sleep(Duration::from_millis(100)).await;
        removed = tokio::fs::remove_dir_all(path).await;
    }
    match removed {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial clone"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), "Failed to remove partial clone: {e}");
            return;
        }
    }
    if state == LocalState::Empty
        && let Err(e) = tokio::fs::create_dir_all(path).await
    {
        tracing::warn!(path = %path.display(), "Failed to recreate target directory: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::platform::ProviderKind;

    /// Records every command and replies from a script keyed by subcommand.
    #[derive(Default)]
    struct ScriptedGit {
        calls: Mutex<Vec<Vec<String>>>,
        failures: Mutex<Vec<(String, String)>>,
        delay: Option<Duration>,
        clone_stderr: String,
        /// `clone` writes `.git` before stalling or failing.
        partial_clone: bool,
    }

    impl ScriptedGit {
        fn fail_on(self, subcommand: &str, stderr: &str) -> Self {
            self.failures
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push((subcommand.to_string(), stderr.to_string()));
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    fn subcommand(args: &[String]) -> &str {
        if args.first().map(String::as_str) == Some("-C") {
            args.get(2).map(String::as_str).unwrap_or("")
        } else {
            args.first().map(String::as_str).unwrap_or("")
        }
    }

    #[async_trait]
    impl GitRunner for ScriptedGit {
        async fn run(&self, args: &[String]) -> Result<GitOutput, GitError> {
            self.calls
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(args.to_vec());
            let sub = subcommand(args).to_string();
            if sub == "clone"
                && self.partial_clone
                && let Some(path) = args.last()
            {
                std::fs::create_dir_all(Path::new(path).join(".git")).expect("mkdir");
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let failure = self
                .failures
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .find(|(s, _)| *s == sub)
                .map(|(_, stderr)| stderr.clone());
            if let Some(stderr) = failure {
                return Err(GitError::from_stderr(format!("git {sub}"), &stderr));
            }
            if sub == "clone" {
                if let Some(path) = args.last() {
                    std::fs::create_dir_all(Path::new(path).join(".git")).expect("mkdir");
                }
                return Ok(GitOutput {
                    stdout: String::new(),
                    stderr: self.clone_stderr.clone(),
                });
            }
            Ok(GitOutput::default())
        }
    }

    fn repo(full_name: &str, org: &str) -> RepositoryDescriptor {
        let name = full_name.rsplit('/').next().unwrap_or(full_name).to_string();
        RepositoryDescriptor {
            provider: ProviderKind::GitLab,
            organization: org.into(),
            name,
            full_name: full_name.into(),
            clone_url: format!("https://gitlab.com/{full_name}.git"),
            private: false,
            archived: false,
            default_branch: "develop".into(),
            language: None,
            updated_at: None,
        }
    }

    fn executor_for(git: &Arc<ScriptedGit>) -> StrategyExecutor {
        StrategyExecutor::new(Arc::clone(git) as Arc<dyn GitRunner>, Duration::from_secs(5))
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_repo_path_strips_org_and_keeps_subgroups() {
        let target = Path::new("/srv/mirror");
        assert_eq!(
            repo_path(target, &repo("acme/api", "acme")),
            PathBuf::from("/srv/mirror/api")
        );
        assert_eq!(
            repo_path(target, &repo("acme/platform/svc", "acme")),
            PathBuf::from("/srv/mirror/platform/svc")
        );
        assert_eq!(
            repo_path(target, &repo("acme/platform/svc", "acme/platform")),
            PathBuf::from("/srv/mirror/svc")
        );
        assert_eq!(
            repo_path(target, &repo("acme/../../etc", "acme")),
            PathBuf::from("/srv/mirror/etc")
        );
        // Organizations are matched case-insensitively.
        assert_eq!(
            repo_path(target, &repo("acme/api", "Acme")),
            PathBuf::from("/srv/mirror/api")
        );
        assert_eq!(
            repo_path(target, &repo("acme-labs/api", "acme")),
            PathBuf::from("/srv/mirror/acme-labs/api")
        );
    }

    #[test]
    fn test_parse_transfer_bytes() {
        let stderr = "Cloning into 'x'...\nremote: Enumerating objects: 10\r\
                      Receiving objects:  50% (5/10), 512.00 KiB | 1.00 MiB/s\r\
                      Receiving objects: 100% (10/10), 1.50 MiB | 2.00 MiB/s, done.\n\
                      Resolving deltas: 100% (2/2), done.\n";
        assert_eq!(parse_transfer_bytes(stderr), Some(1_572_864));
        assert_eq!(
            parse_transfer_bytes("Receiving objects: 100% (3/3), done."),
            None
        );
        assert_eq!(
            parse_transfer_bytes("Receiving objects: 100% (3/3), 812 bytes | 812.00 KiB/s, done."),
            Some(812)
        );
    }

    #[test]
    fn test_classify_stderr() {
        let cases = [
            (
                "fatal: could not read Username for 'https://github.com': terminal prompts disabled",
                GitErrorKind::Auth,
            ),
            (
                "remote: Repository not found.\nfatal: repository 'x' not found",
                GitErrorKind::NotFound,
            ),
            (
                "CONFLICT (content): Merge conflict in README.md",
                GitErrorKind::MergeConflict,
            ),
            (
                "fatal: Not possible to fast-forward, aborting.",
                GitErrorKind::MergeConflict,
            ),
            (
                "error: unable to write file: No space left on device",
                GitErrorKind::DiskFull,
            ),
            (
                "fatal: unable to access 'https://x/': Could not resolve host: x",
                GitErrorKind::Network,
            ),
            ("fatal: not a git repository", GitErrorKind::NotARepository),
            ("fatal: bad object HEAD", GitErrorKind::Other),
        ];
        for (stderr, expected) in cases {
            assert_eq!(GitErrorKind::classify(stderr), expected, "{stderr}");
        }
    }

    #[tokio::test]
    async fn test_missing_path_is_cloned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = Arc::new(ScriptedGit {
            clone_stderr: "Receiving objects: 100% (4/4), 2.00 KiB | 2.00 MiB/s, done.".into(),
            ..ScriptedGit::default()
        });
        let outcome = executor_for(&git)
            .execute(&repo("acme/platform/api", "acme"), dir.path(), Strategy::Reset)
            .await
            .expect("clone");

        let path = dir.path().join("platform/api");
        assert_eq!(outcome.action, Action::Cloned);
        assert_eq!(outcome.path, path);
        assert_eq!(outcome.bytes_transferred, 2048);
        assert_eq!(
            git.calls(),
            vec![args(&[
                "clone",
                "--progress",
                "--",
                "https://gitlab.com/acme/platform/api.git",
                &path.display().to_string(),
            ])]
        );
    }

    #[tokio::test]
    async fn test_reset_fetches_resets_and_cleans() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api");
        std::fs::create_dir_all(path.join(".git")).expect("mkdir");
        let git = Arc::new(ScriptedGit::default());

        let outcome = executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Reset)
            .await
            .expect("reset");
        assert_eq!(outcome.action, Action::Updated(Strategy::Reset));

        let p = path.display().to_string();
        assert_eq!(
            git.calls(),
            vec![
                args(&["-C", &p, "fetch", "--prune", "origin"]),
                args(&["-C", &p, "reset", "--hard", "origin/develop"]),
                args(&["-C", &p, "clean", "-fd"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_and_fetch_strategies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api");
        std::fs::create_dir_all(path.join(".git")).expect("mkdir");
        let p = path.display().to_string();

        let git = Arc::new(ScriptedGit::default());
        executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Pull)
            .await
            .expect("pull");
        executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Fetch)
            .await
            .expect("fetch");
        assert_eq!(
            git.calls(),
            vec![
                args(&["-C", &p, "pull", "--no-rebase", "--ff"]),
                args(&["-C", &p, "fetch", "--all", "--prune"]),
            ]
        );
    }

    #[tokio::test]
    async fn test_pull_conflict_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("api/.git")).expect("mkdir");
        let git = Arc::new(
            ScriptedGit::default().fail_on("pull", "CONFLICT (content): Merge conflict in a.txt"),
        );

        let err = executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Pull)
            .await
            .expect_err("conflict");
        assert_eq!(err.kind, GitErrorKind::MergeConflict);
        assert!(err.message.contains("Merge conflict"));
    }

    #[tokio::test]
    async fn test_occupied_directory_is_not_cloned_over() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("api")).expect("mkdir");
        std::fs::write(dir.path().join("api/notes.txt"), "local").expect("write");
        let git = Arc::new(ScriptedGit::default());

        let err = executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Reset)
            .await
            .expect_err("occupied");
        assert_eq!(err.kind, GitErrorKind::NotARepository);
        assert!(git.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_directory_is_cloned_into() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("api")).expect("mkdir");
        let git = Arc::new(ScriptedGit::default());

        let outcome = executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Fetch)
            .await
            .expect("clone");
        assert_eq!(outcome.action, Action::Cloned);
    }

    #[tokio::test]
    async fn test_slow_operation_times_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let git = Arc::new(ScriptedGit {
            delay: Some(Duration::from_secs(5)),
            ..ScriptedGit::default()
        });
        let executor =
            StrategyExecutor::new(Arc::clone(&git) as Arc<dyn GitRunner>, Duration::from_millis(50));

        let err = executor
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Reset)
            .await
            .expect_err("timeout");
        assert_eq!(err.kind, GitErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_timed_out_clone_is_discarded_and_recloned() {
        let dir = tempfile::tempdir().expect("tempdir");
        let stalled = Arc::new(ScriptedGit {
            delay: Some(Duration::from_secs(5)),
            partial_clone: true,
            ..ScriptedGit::default()
        });
        let executor =
            StrategyExecutor::new(Arc::clone(&stalled) as Arc<dyn GitRunner>, Duration::from_millis(50));

        let err = executor
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Fetch)
            .await
            .expect_err("timeout");
        assert_eq!(err.kind, GitErrorKind::Timeout);
        assert!(!dir.path().join("api").exists());

        let git = Arc::new(ScriptedGit::default());
        let outcome = executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Fetch)
            .await
            .expect("second attempt");
        assert_eq!(outcome.action, Action::Cloned);
    }

    #[tokio::test]
    async fn test_failed_clone_restores_empty_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("api");
        std::fs::create_dir_all(&path).expect("mkdir");
        let git = Arc::new(ScriptedGit {
            partial_clone: true,
            ..ScriptedGit::default().fail_on("clone", "fatal: early EOF")
        });

        let err = executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Reset)
            .await
            .expect_err("clone fails");
        assert_eq!(err.kind, GitErrorKind::Network);
        assert!(path.is_dir());
        assert_eq!(std::fs::read_dir(&path).expect("read").count(), 0);
    }

    #[tokio::test]
    async fn test_failed_update_keeps_checkout() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("api/.git")).expect("mkdir");
        let git = Arc::new(ScriptedGit::default().fail_on("fetch", "fatal: early EOF"));

        executor_for(&git)
            .execute(&repo("acme/api", "acme"), dir.path(), Strategy::Fetch)
            .await
            .expect_err("fetch fails");
        assert!(dir.path().join("api/.git").is_dir());
    }
}
