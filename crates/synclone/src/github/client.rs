//! GitHub REST client for organization repository listing.

use std::sync::Arc;

use async_trait::async_trait;

use super::convert::to_descriptor;
use super::error::GitHubError;
use super::types::GitHubRepo;
use crate::cancel::CancelToken;
use crate::http::{DEFAULT_HTTP_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::platform::headers::{
    cursor_to_page, next_cursor_from_link, normalize_host, parse_rate_limit_headers,
    rate_limit_or_fallback,
};
use crate::platform::{
    self, ProviderClient, ProviderKind, RateLimiter, RepoPage, USER_AGENT, path_segment,
};

/// Public GitHub API base.
pub const GITHUB_API: &str = "https://api.github.com";

/// Repositories requested per page (GitHub's maximum).
pub const PER_PAGE: u32 = 100;

const RATE_LIMIT_PREFIX: &str = "x-ratelimit";

/// GitHub API client.
///
/// Works against github.com and GitHub Enterprise Server; the API base is
/// derived from the host.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    host: String,
    api_base: String,
    token: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

impl GitHubClient {
    /// Create a client with a reqwest transport.
    pub fn new(
        host: &str,
        token: Option<&str>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, GitHubError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_HTTP_TIMEOUT)
            .map_err(|e| GitHubError::Config(e.to_string()))?;
        Ok(Self::new_with_transport(
            host,
            token,
            rate_limiter,
            Arc::new(transport),
        ))
    }

    pub fn new_with_transport(
        host: &str,
        token: Option<&str>,
        rate_limiter: Arc<RateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        let host = normalize_host(host);
        Self {
            transport,
            api_base: api_base_for_host(&host),
            host,
            token: token.map(str::to_string),
            rate_limiter,
        }
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn request(&self, url: String) -> HttpRequest {
        let request = HttpRequest::get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .header("User-Agent", USER_AGENT);
        match self.token {
            Some(ref token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    async fn get(&self, url: String, cancel: &CancelToken) -> Result<HttpResponse, GitHubError> {
        self.rate_limiter
            .acquire(cancel)
            .await
            .map_err(|_| GitHubError::Cancelled)?;

        let response = self
            .transport
            .send(self.request(url))
            .await
            .map_err(|e| GitHubError::Http(e.to_string()))?;

        if let Some(info) = parse_rate_limit_headers(&response.headers, RATE_LIMIT_PREFIX) {
            self.rate_limiter.observe(&info);
        }

        if is_rate_limit_response(&response) {
            let info = rate_limit_or_fallback(&response.headers, RATE_LIMIT_PREFIX);
            self.rate_limiter.suspend_until_reset(&info);
            return Err(GitHubError::RateLimited {
                reset_at: info.reset_at,
            });
        }

        Ok(response)
    }

    /// Fetch one page of an organization's repositories.
    ///
    /// Returns the repositories and the cursor of the next page, if any.
    pub async fn list_org_repos_page(
        &self,
        org: &str,
        page: u32,
        cancel: &CancelToken,
    ) -> Result<(Vec<GitHubRepo>, Option<String>), GitHubError> {
        let url = format!(
            "{}/orgs/{}/repos?type=all&per_page={}&page={}",
            self.api_base,
            path_segment(org),
            PER_PAGE,
            page
        );
        let response = self.get(url, cancel).await?;

        match response.status {
            404 => Err(GitHubError::OrgNotFound(org.to_string())),
            s if !(200..300).contains(&s) => Err(GitHubError::Api {
                status: s,
                message: response.body_text(),
            }),
            _ => {
                let repos: Vec<GitHubRepo> = serde_json::from_slice(&response.body)?;
                Ok((repos, next_cursor_from_link(&response.headers)))
            }
        }
    }
}

/// github.com uses `api.github.com`; Enterprise Server serves under `/api/v3`.
pub fn api_base_for_host(host: &str) -> String {
    let host = normalize_host(host);
    match host.as_str() {
        "https://github.com" | "https://www.github.com" | GITHUB_API => GITHUB_API.to_string(),
        _ => format!("{host}/api/v3"),
    }
}

/// Primary limits come back as 403 with a zero remaining count, secondary
/// limits as 403/429 with `Retry-After`.
fn is_rate_limit_response(response: &HttpResponse) -> bool {
    match response.status {
        429 => true,
        403 => {
            response.header("x-ratelimit-remaining").map(str::trim) == Some("0")
                || response.header("retry-after").is_some()
        }
        _ => false,
    }
}

#[async_trait]
impl ProviderClient for GitHubClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GitHub
    }

    fn host(&self) -> &str {
        &self.host
    }

    fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    async fn list_repositories(
        &self,
        org: &str,
        cursor: Option<&str>,
        cancel: &CancelToken,
    ) -> platform::Result<RepoPage> {
        let page = cursor_to_page(cursor)?;
        let (repos, next_cursor) = self.list_org_repos_page(org, page, cancel).await?;
        tracing::debug!(org, page, count = repos.len(), "Fetched GitHub page");

        Ok(RepoPage {
            repos: repos.into_iter().map(|r| to_descriptor(r, org)).collect(),
            next_cursor,
        })
    }
}
