use chrono::{DateTime, Utc};
use thiserror::Error;

use super::rate_limit::RateLimitError;

/// Errors returned across the provider boundary.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// API error from the platform.
    #[error("API error: {message}")]
    Api { message: String },

    /// Rate limit exceeded. The host limiter has already been suspended until
    /// `reset_at`; retrying the same page is the expected response.
    #[error("Rate limit exceeded. Resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    /// Authentication required or failed.
    #[error("Authentication required")]
    AuthRequired,

    /// Resource not found (org, group, etc.).
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Network or connection error.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },

    /// The caller cancelled while the request was waiting on the limiter.
    #[error("Request cancelled")]
    Cancelled,
}

impl PlatformError {
    #[inline]
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Transient failures worth retrying with backoff.
    ///
    /// Rate limiting is not included: it is absorbed by the limiter wait and
    /// never counts as a failed attempt.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

impl From<RateLimitError> for PlatformError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Cancelled => Self::Cancelled,
        }
    }
}

/// Map a non-success HTTP status to the shared error taxonomy.
///
/// Rate-limit responses are detected by the caller before this is reached,
/// so 403 here always means an authorization failure.
pub fn error_for_status(status: u16, resource: &str, body: String) -> PlatformError {
    match status {
        401 | 403 => PlatformError::AuthRequired,
        404 => PlatformError::not_found(resource),
        500..=599 => PlatformError::network(format!("server error {status}: {body}")),
        _ => PlatformError::api(format!("{status}: {body}")),
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message, which keeps progress output
/// readable when an error carries multi-line stderr or response bodies.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for platform operations.
pub type Result<T> = std::result::Result<T, PlatformError>;
