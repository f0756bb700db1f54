//! GitLab API payloads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// The subset of GitLab's project object needed for cloning.
#[derive(Debug, Clone, Deserialize)]
pub struct GitLabProject {
    /// URL slug of the project, used as its name.
    pub path: String,
    pub path_with_namespace: String,
    pub http_url_to_repo: String,
    /// `public`, `internal` or `private`.
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub last_activity_at: Option<DateTime<Utc>>,
}

impl GitLabProject {
    /// Anything not explicitly public needs credentials to clone.
    pub fn is_private(&self) -> bool {
        self.visibility.as_deref() != Some("public")
    }
}
