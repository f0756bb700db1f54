//! Provider-agnostic repository listing.
//!
//! Each hosting platform implements [`ProviderClient`]; everything above this
//! module (stream, scheduler, coordinator) only ever sees that trait and the
//! [`RepositoryDescriptor`] values it yields.
//!
//! # Example
//!
//! ```ignore
//! use synclone::cancel::CancelToken;
//! use synclone::platform::{ClientFactory, HttpClientFactory, ProviderKind};
//!
//! let factory = HttpClientFactory::new().with_token(ProviderKind::GitHub, token);
//! let client = factory.create(ProviderKind::GitHub, None)?;
//! let page = client.list_repositories("rust-lang", None, &CancelToken::new()).await?;
//! println!("{} repos, more: {}", page.repos.len(), page.next_cursor.is_some());
//! ```

mod errors;
mod factory;
pub mod headers;
mod rate_limit;
mod types;

pub use errors::{PlatformError, Result, error_for_status, short_error_message};
pub use factory::{ClientFactory, HttpClientFactory, ProviderCredentials};
pub use rate_limit::{
    RateLimitError, RateLimiter, RateLimiterConfig, RateLimiterRegistry, RateLimiterState,
    default_rps_for_provider, rate_limits,
};
pub use types::{ProviderClient, ProviderKind, RateLimitInfo, RepoPage, RepositoryDescriptor};

/// Fallback default branch when a provider reports none (empty repositories).
pub const FALLBACK_DEFAULT_BRANCH: &str = "main";

/// User agent sent with every API request.
pub const USER_AGENT: &str = concat!("synclone/", env!("CARGO_PKG_VERSION"));

/// Percent-encode `value` as a single URL path segment, so a name with `/`
/// or reserved characters cannot change the request path.
pub fn path_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    #[test]
    fn test_platform_error_display() {
        assert!(
            PlatformError::api("Something went wrong")
                .to_string()
                .contains("Something went wrong")
        );
        assert!(
            PlatformError::not_found("organization: acme")
                .to_string()
                .contains("Not found")
        );
        assert!(
            PlatformError::RateLimited {
                reset_at: Utc::now()
            }
            .to_string()
            .contains("Rate limit")
        );
        assert_eq!(PlatformError::AuthRequired.to_string(), "Authentication required");
    }

    #[test]
    fn test_platform_error_classification() {
        assert!(PlatformError::network("reset").is_transient());
        assert!(!PlatformError::AuthRequired.is_transient());
        assert!(
            !PlatformError::RateLimited {
                reset_at: Utc::now()
            }
            .is_transient()
        );
        assert!(
            PlatformError::RateLimited {
                reset_at: Utc::now()
            }
            .is_rate_limited()
        );
    }

    #[test]
    fn test_error_for_status_mapping() {
        assert!(matches!(
            error_for_status(401, "org", String::new()),
            PlatformError::AuthRequired
        ));
        assert!(matches!(
            error_for_status(404, "organization: acme", String::new()),
            PlatformError::NotFound { resource } if resource == "organization: acme"
        ));
        assert!(error_for_status(502, "org", "bad gateway".into()).is_transient());
        assert!(matches!(
            error_for_status(422, "org", "nope".into()),
            PlatformError::Api { .. }
        ));
    }

    #[test]
    fn test_rate_limit_error_converts_to_cancelled() {
        let err: PlatformError = RateLimitError::Cancelled.into();
        assert!(matches!(err, PlatformError::Cancelled));
    }

    #[test]
    fn test_short_error_message_takes_first_line() {
        let err = PlatformError::api("line one\nline two");
        assert_eq!(short_error_message(&err), "API error: line one");
    }

    #[test]
    fn test_path_segment_escapes_separators() {
        assert_eq!(path_segment("acme"), "acme");
        assert_eq!(path_segment("acme/platform"), "acme%2Fplatform");
        assert_eq!(path_segment("../admin?x=1"), "..%2Fadmin%3Fx%3D1");
    }
}
