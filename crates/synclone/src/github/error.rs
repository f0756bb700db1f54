//! GitHub API error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::platform::{PlatformError, error_for_status};

/// Errors that can occur when interacting with the GitHub API.
#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Organization not found: {0}")]
    OrgNotFound(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<GitHubError> for PlatformError {
    fn from(err: GitHubError) -> Self {
        match err {
            GitHubError::Http(message) => PlatformError::Network { message },
            GitHubError::Json(e) => PlatformError::internal(format!("JSON parse error: {e}")),
            GitHubError::Api { status, message } => error_for_status(status, "resource", message),
            GitHubError::RateLimited { reset_at } => PlatformError::RateLimited { reset_at },
            GitHubError::OrgNotFound(org) => PlatformError::not_found(format!("organization: {org}")),
            GitHubError::Cancelled => PlatformError::Cancelled,
            GitHubError::Config(message) => PlatformError::Internal { message },
        }
    }
}
