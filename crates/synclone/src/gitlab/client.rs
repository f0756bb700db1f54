//! GitLab REST client for group project listing.

use std::sync::Arc;

use async_trait::async_trait;

use super::convert::to_descriptor;
use super::error::GitLabError;
use super::types::GitLabProject;
use crate::cancel::CancelToken;
use crate::http::{DEFAULT_HTTP_TIMEOUT, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
use crate::platform::headers::{
    cursor_to_page, normalize_host, parse_rate_limit_headers, rate_limit_or_fallback,
};
use crate::platform::{
    self, ProviderClient, ProviderKind, RateLimiter, RepoPage, USER_AGENT, path_segment,
};

/// Projects requested per page (GitLab's maximum).
pub const PER_PAGE: u32 = 100;

const RATE_LIMIT_PREFIX: &str = "ratelimit";

#[derive(Clone)]
pub struct GitLabClient {
    transport: Arc<dyn HttpTransport>,
    host: String,
    token: Option<String>,
    rate_limiter: Arc<RateLimiter>,
}

impl GitLabClient {
    pub fn new(
        host: &str,
        token: Option<&str>,
        rate_limiter: Arc<RateLimiter>,
    ) -> Result<Self, GitLabError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_HTTP_TIMEOUT)
            .map_err(|e| GitLabError::Config(e.to_string()))?;
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
        Self {
            transport,
            host: normalize_host(host),
            token: token.map(str::to_string),
            rate_limiter,
        }
    }

    /// Build the listing URL; the group path is percent-encoded as one
    /// segment (`acme/platform` becomes `acme%2Fplatform`).
    fn projects_url(&self, group: &str, page: u32) -> String {
        format!(
            "{}/api/v4/groups/{}/projects?include_subgroups=true&per_page={}&page={}",
            self.host,
            path_segment(group),
            PER_PAGE,
            page
        )
    }

    async fn get(&self, url: String, cancel: &CancelToken) -> Result<HttpResponse, GitLabError> {
        self.rate_limiter
            .acquire(cancel)
            .await
            .map_err(|_| GitLabError::Cancelled)?;

        let mut request = HttpRequest::get(url)
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT);
        if let Some(ref token) = self.token {
            request = request.header("PRIVATE-TOKEN", token.clone());
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| GitLabError::Http(e.to_string()))?;

        if let Some(info) = parse_rate_limit_headers(&response.headers, RATE_LIMIT_PREFIX) {
            self.rate_limiter.observe(&info);
        }

        if response.status == 429 {
            let info = rate_limit_or_fallback(&response.headers, RATE_LIMIT_PREFIX);
            self.rate_limiter.suspend_until_reset(&info);
            return Err(GitLabError::RateLimited {
                reset_at: info.reset_at,
            });
        }

        Ok(response)
    }

    /// Fetch one page of a group's projects, including subgroups.
    pub async fn list_group_projects_page(
        &self,
        group: &str,
        page: u32,
        cancel: &CancelToken,
    ) -> Result<(Vec<GitLabProject>, Option<String>), GitLabError> {
        let response = self.get(self.projects_url(group, page), cancel).await?;

        match response.status {
            404 => Err(GitLabError::GroupNotFound(group.to_string())),
            s if !(200..300).contains(&s) => Err(GitLabError::Api {
                status: s,
                message: response.body_text(),
            }),
            _ => {
                let projects: Vec<GitLabProject> = serde_json::from_slice(&response.body)?;
                let next = response
                    .header("x-next-page")
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(str::to_string);
                Ok((projects, next))
            }
        }
    }
}

#[async_trait]
impl ProviderClient for GitLabClient {
    fn provider(&self) -> ProviderKind {
        ProviderKind::GitLab
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
        let (projects, next_cursor) = self.list_group_projects_page(org, page, cancel).await?;
        tracing::debug!(group = org, page, count = projects.len(), "Fetched GitLab page");

        Ok(RepoPage {
            repos: projects
                .into_iter()
                .map(|p| to_descriptor(p, org))
                .collect(),
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{MockTransport, header_get, json_response};
    use crate::platform::{PlatformError, RateLimiterConfig};

    const HOST: &str = "https://gitlab.example.com";

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(HOST, RateLimiterConfig::bucket(100, 100.0)))
    }

    fn project_json(path: &str) -> serde_json::Value {
        serde_json::json!({
            "id": 7,
            "path": path,
            "path_with_namespace": format!("acme/platform/{path}"),
            "http_url_to_repo": format!("{HOST}/acme/platform/{path}.git"),
            "visibility": "private",
            "archived": false,
            "default_branch": "main",
            "last_activity_at": "2024-03-01T10:00:00Z"
        })
    }

    fn url(page: u32) -> String {
        format!("{HOST}/api/v4/groups/acme%2Fplatform/projects?include_subgroups=true&per_page=100&page={page}")
    }

    #[tokio::test]
    async fn test_next_page_header_becomes_cursor() {
        let transport = MockTransport::new();
        let body = serde_json::to_string(&vec![project_json("svc-a"), project_json("svc-b")])
            .expect("serialize");
        transport.push_response(
            url(1),
            json_response(
                200,
                &[
                    ("X-Next-Page", "2"),
                    ("X-Total-Pages", "2"),
                    ("RateLimit-Limit", "2000"),
                    ("RateLimit-Remaining", "1999"),
                    ("RateLimit-Reset", "4102444800"),
                ],
                &body,
            ),
        );
        transport.push_response(url(2), json_response(200, &[("X-Next-Page", "")], "[]"));

        let client = GitLabClient::new_with_transport(
            "gitlab.example.com/",
            Some("glpat-test"),
            limiter(),
            Arc::new(transport.clone()),
        );
        let cancel = CancelToken::new();

        let first = client
            .list_repositories("acme/platform", None, &cancel)
            .await
            .expect("first page");
        assert_eq!(first.repos.len(), 2);
        assert_eq!(first.repos[1].full_name, "acme/platform/svc-b");
        assert!(first.repos[0].private);
        assert_eq!(first.next_cursor.as_deref(), Some("2"));

        let second = client
            .list_repositories("acme/platform", first.next_cursor.as_deref(), &cancel)
            .await
            .expect("second page");
        assert!(second.next_cursor.is_none());

        let requests = transport.requests();
        assert_eq!(
            header_get(&requests[0].headers, "private-token"),
            Some("glpat-test")
        );
    }

    #[tokio::test]
    async fn test_too_many_requests_is_rate_limited() {
        let transport = MockTransport::new();
        transport.push_response(
            url(1),
            json_response(429, &[("Retry-After", "12")], "Retry later"),
        );

        let limiter = limiter();
        let client = GitLabClient::new_with_transport(
            HOST,
            None,
            Arc::clone(&limiter),
            Arc::new(transport),
        );
        let err = client
            .list_repositories("acme/platform", None, &CancelToken::new())
            .await
            .expect_err("rate limited");

        assert!(err.is_rate_limited());
        let suspended = limiter.suspended_for().expect("suspended");
        assert!(suspended <= std::time::Duration::from_secs(12));
    }

    #[tokio::test]
    async fn test_unknown_group_is_not_found() {
        let transport = MockTransport::new();
        transport.push_response(url(1), json_response(404, &[], "{\"message\":\"404 Group Not Found\"}"));

        let client = GitLabClient::new_with_transport(HOST, None, limiter(), Arc::new(transport));
        let err = client
            .list_repositories("acme/platform", None, &CancelToken::new())
            .await
            .expect_err("not found");
        assert!(matches!(err, PlatformError::NotFound { resource } if resource.contains("acme/platform")));
    }
}
