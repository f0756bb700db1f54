//! GitHub organization listing.
//!
//! - [`error`] - Error types for GitHub API calls
//! - [`types`] - Response payloads
//! - [`client`] - HTTP client and `ProviderClient` implementation
//! - [`convert`] - Payload to descriptor conversion

mod client;
mod convert;
mod error;
mod types;

pub use client::{GITHUB_API, GitHubClient, PER_PAGE};
pub use error::GitHubError;
pub use types::GitHubRepo;
