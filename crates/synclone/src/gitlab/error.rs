//! GitLab API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::platform::{PlatformError, error_for_status};

#[derive(Debug, Error)]
pub enum GitLabError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GitLab API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<GitLabError> for PlatformError {
    fn from(err: GitLabError) -> Self {
        match err {
            GitLabError::Http(message) => PlatformError::Network { message },
            GitLabError::Json(e) => PlatformError::internal(format!("JSON parse error: {e}")),
            GitLabError::Api { status, message } => error_for_status(status, "resource", message),
            GitLabError::RateLimited { reset_at } => PlatformError::RateLimited { reset_at },
            GitLabError::GroupNotFound(group) => PlatformError::not_found(format!("group: {group}")),
            GitLabError::Cancelled => PlatformError::Cancelled,
            GitLabError::Config(message) => PlatformError::Internal { message },
        }
    }
}
