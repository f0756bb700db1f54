//! Gitea/Gogs API client.

use std::sync::Arc;

use async_trait::async_trait;

use super::convert::to_descriptor;
use super::error::GiteaError;
use super::types::GiteaRepo;
use crate::cancel::CancelToken;
use crate::http::{DEFAULT_HTTP_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::platform::headers::{
    cursor_to_page, next_cursor_from_link, normalize_host, parse_rate_limit_headers,
    rate_limit_or_fallback,
};
use crate::platform::{
    self, ProviderClient, ProviderKind, RateLimiter, RepoPage, USER_AGENT, path_segment,
};

/// Default Codeberg host.
pub const CODEBERG_HOST: &str = "https://codeberg.org";

/// Default page size for API requests.
pub const PAGE_SIZE: u32 = 50;

const RATE_LIMIT_PREFIX: &str = "x-ratelimit";

/// Which server family the client is talking to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Gitea,
    Gogs,
}

/// Gitea API client.
///
/// Compatible with Gitea, Forgejo, Codeberg and (in [`Flavor::Gogs`] mode)
/// Gogs.
#[derive(Clone)]
pub struct GiteaClient {
    transport: Arc<dyn HttpTransport>,
    host: String,
    token: Option<String>,
    flavor: Flavor,
    rate_limiter: Arc<RateLimiter>,
}

impl GiteaClient {
    /// Create a new client.
    ///
    /// ```ignore
    /// let limiter = registry.for_host(ProviderKind::Gitea, CODEBERG_HOST);
    /// let client = GiteaClient::new(CODEBERG_HOST, Some("token"), Flavor::Gitea, limiter)?;
    /// ```
    pub fn new(
        host: &str,
        token: Option<&str>,
        flavor: Flavor,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, GiteaError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_HTTP_TIMEOUT)
            .map_err(|e| GiteaError::Config(e.to_string()))?;

        Ok(Self::new_with_transport(
            host,
            token,
            flavor,
            rate_limiter,
            Arc::new(transport),
        ))
    }

    pub fn new_with_transport(
        host: &str,
        token: Option<&str>,
        flavor: Flavor,
        rate_limiter: Arc<RateLimiter>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            host: normalize_host(host),
            token: token.map(str::to_string),
            flavor,
            rate_limiter,
        }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }

    /// Make an authenticated GET request under `/api/v1`.
    async fn get(&self, path: &str, cancel: &CancelToken) -> Result<HttpResponse, GiteaError> {
        self.rate_limiter
            .acquire(cancel)
            .await
            .map_err(|_| GiteaError::Cancelled)?;

        let mut request = HttpRequest::get(format!("{}/api/v1{}", self.host, path))
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        if let Some(ref token) = self.token {
            request = request.header("Authorization", format!("token {token}"));
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| GiteaError::Http(e.to_string()))?;

        if let Some(info) = parse_rate_limit_headers(&response.headers, RATE_LIMIT_PREFIX) {
            self.rate_limiter.observe(&info);
        }

        let exhausted = response.status == 403
            && response.header("x-ratelimit-remaining").map(str::trim) == Some("0");
        if response.status == 429 || exhausted {
            let info = rate_limit_or_fallback(&response.headers, RATE_LIMIT_PREFIX);
            self.rate_limiter.suspend_until_reset(&info);
            return Err(GiteaError::RateLimited {
                reset_at: info.reset_at,
            });
        }

        Ok(response)
    }

    /// Fetch one page of an organization's repositories.
    pub async fn list_org_repos_page(
        &self,
        org: &str,
        page: u32,
        cancel: &CancelToken,
    ) -> Result<(Vec<GiteaRepo>, Option<String>), GiteaError> {
        let segment = path_segment(org);
        let path = match self.flavor {
            Flavor::Gitea => format!("/orgs/{segment}/repos?page={page}&limit={PAGE_SIZE}"),
            Flavor::Gogs => format!("/orgs/{segment}/repos"),
        };
        let response = self.get(&path, cancel).await?;

        if response.status == 404 {
            return Err(GiteaError::OrgNotFound(org.to_string()));
        }
        if !response.is_success() {
            return Err(GiteaError::Api {
                status: response.status,
                message: response.body_text(),
            });
        }

        let repos: Vec<GiteaRepo> = serde_json::from_slice(&response.body)?;
        let next = match self.flavor {
            Flavor::Gogs => None,
            // Older Gitea releases send no Link header; a full page implies
            // another one may follow.
            Flavor::Gitea => next_cursor_from_link(&response.headers).or_else(|| {
                (response.header("link").is_none() && repos.len() >= PAGE_SIZE as usize)
                    .then(|| (page + 1).to_string())
            }),
        };
        Ok((repos, next))
    }
}

#[async_trait]
impl ProviderClient for GiteaClient {
    fn provider(&self) -> ProviderKind {
        match self.flavor {
            Flavor::Gitea => ProviderKind::Gitea,
            Flavor::Gogs => ProviderKind::Gogs,
        }
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
        tracing::debug!(org, page, count = repos.len(), flavor = ?self.flavor, "Fetched Gitea page");

        let provider = self.provider();
        Ok(RepoPage {
            repos: repos
                .into_iter()
                .map(|r| to_descriptor(r, org, provider))
                .collect(),
            next_cursor,
        })
    }
}
