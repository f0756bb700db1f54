use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::Result;
use super::rate_limit::RateLimiter;
use crate::cancel::CancelToken;

/// Supported hosting platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    GitHub,
    GitLab,
    Gitea,
    Gogs,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [Self::GitHub, Self::GitLab, Self::Gitea, Self::Gogs];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitHub => "github",
            Self::GitLab => "gitlab",
            Self::Gitea => "gitea",
            Self::Gogs => "gogs",
        }
    }

    /// Public host used when the caller does not name one.
    pub fn default_host(self) -> &'static str {
        match self {
            Self::GitHub => "https://github.com",
            Self::GitLab => "https://gitlab.com",
            Self::Gitea => "https://gitea.com",
            Self::Gogs => "https://try.gogs.io",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Ok(Self::GitHub),
            "gitlab" => Ok(Self::GitLab),
            "gitea" | "forgejo" | "codeberg" => Ok(Self::Gitea),
            "gogs" => Ok(Self::Gogs),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}

/// Immutable snapshot of one remote repository as reported at enumeration
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryDescriptor {
    pub provider: ProviderKind,
    pub organization: String,
    pub name: String,
    /// Unique key within a session, e.g. `org/name` or `group/sub/name`.
    pub full_name: String,
    pub clone_url: String,
    pub private: bool,
    pub archived: bool,
    pub default_branch: String,
    pub language: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// One page of a repository listing.
#[derive(Debug, Clone, Default)]
pub struct RepoPage {
    pub repos: Vec<RepositoryDescriptor>,
    /// Opaque token for the following page; `None` ends the listing.
    pub next_cursor: Option<String>,
}

/// Rate limit information parsed from response headers.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitInfo {
    pub limit: usize,
    pub remaining: usize,
    pub reset_at: DateTime<Utc>,
    /// Explicit server-provided wait (`Retry-After`), which wins over
    /// `reset_at` when present.
    pub retry_after: Option<Duration>,
}

/// Repository listing for one hosting platform.
///
/// Implementations must pass every request through [`RateLimiter::acquire`]
/// for their host, feed response headers back through
/// [`RateLimiter::observe`], and on a rate-limit response suspend the limiter
/// and return [`PlatformError::RateLimited`](super::PlatformError::RateLimited).
/// Pagination state lives entirely in the cursor string.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn provider(&self) -> ProviderKind;

    /// Normalized host URL, used as the rate-limiter key.
    fn host(&self) -> &str;

    fn rate_limiter(&self) -> &Arc<RateLimiter>;

    /// Fetch the page at `cursor` (`None` for the first page).
    async fn list_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        cancel: &CancelToken,
    ) -> Result<RepoPage>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_round_trips_through_str() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>(), Ok(kind));
        }
        assert_eq!("Forgejo".parse::<ProviderKind>(), Ok(ProviderKind::Gitea));
        assert!("bitbucket".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn provider_kind_serializes_lowercase() {
        let json = serde_json::to_string(&ProviderKind::GitLab).expect("serialize");
        assert_eq!(json, "\"gitlab\"");
    }
}
