//! Gitea/Gogs API payloads.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Repository object as returned by both Gitea and Gogs. Gogs omits
/// `archived` and `language`.
#[derive(Debug, Clone, Deserialize)]
pub struct GiteaRepo {
    pub name: String,
    pub full_name: String,
    pub clone_url: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}
