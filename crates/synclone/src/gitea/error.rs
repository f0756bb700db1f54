//! Error types for Gitea and Gogs API calls.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::platform::{PlatformError, error_for_status};

#[derive(Debug, Error)]
pub enum GiteaError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// API returned an error response.
    #[error("API error ({status}): {message}")]
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

impl From<GiteaError> for PlatformError {
    fn from(err: GiteaError) -> Self {
        match err {
            GiteaError::Http(message) => PlatformError::Network { message },
            GiteaError::Json(e) => PlatformError::internal(format!("JSON parse error: {e}")),
            GiteaError::Api { status, message } => error_for_status(status, "resource", message),
            GiteaError::RateLimited { reset_at } => PlatformError::RateLimited { reset_at },
            GiteaError::OrgNotFound(org) => PlatformError::not_found(format!("organization: {org}")),
            GiteaError::Cancelled => PlatformError::Cancelled,
            GiteaError::Config(message) => PlatformError::Internal { message },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gitea_error_to_platform_error() {
        let err: PlatformError = GiteaError::Api {
            status: 403,
            message: "token does not have required scope".into(),
        }
        .into();
        assert!(matches!(err, PlatformError::AuthRequired));

        let err: PlatformError = GiteaError::Api {
            status: 503,
            message: "maintenance".into(),
        }
        .into();
        assert!(err.is_transient());
    }
}
