use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::errors::{PlatformError, Result};
use super::headers::normalize_host;
use super::rate_limit::RateLimiterRegistry;
use super::types::{ProviderClient, ProviderKind};
use crate::http::{DEFAULT_HTTP_TIMEOUT, HttpTransport, ReqwestTransport};

/// Token and host for one provider, supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub token: Option<String>,
    pub host: Option<String>,
}

/// Builds provider clients for a session.
///
/// The coordinator asks for a client by provider kind and optional host and
/// never touches credentials itself.
pub trait ClientFactory: Send + Sync {
    fn create(&self, kind: ProviderKind, host: Option<&str>) -> Result<Arc<dyn ProviderClient>>;
}

/// Factory for the real HTTP-backed clients.
pub struct HttpClientFactory {
    credentials: HashMap<ProviderKind, ProviderCredentials>,
    limiters: RateLimiterRegistry,
    transport: Option<Arc<dyn HttpTransport>>,
    timeout: Duration,
}

impl Default for HttpClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClientFactory {
    pub fn new() -> Self {
        Self {
            credentials: HashMap::new(),
            limiters: RateLimiterRegistry::new(),
            transport: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_credentials(mut self, kind: ProviderKind, credentials: ProviderCredentials) -> Self {
        self.credentials.insert(kind, credentials);
        self
    }

    #[must_use]
    pub fn with_token(mut self, kind: ProviderKind, token: impl Into<String>) -> Self {
        self.credentials.entry(kind).or_default().token = Some(token.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, kind: ProviderKind, host: impl Into<String>) -> Self {
        self.credentials.entry(kind).or_default().host = Some(host.into());
        self
    }

    /// Share limiters with other factories or inspect them.
    #[must_use]
    pub fn with_limiters(mut self, limiters: RateLimiterRegistry) -> Self {
        self.limiters = limiters;
        self
    }

    /// Use a fixed transport instead of building a reqwest client per call.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn limiters(&self) -> &RateLimiterRegistry {
        &self.limiters
    }

    fn transport(&self) -> Result<Arc<dyn HttpTransport>> {
        match self.transport {
            Some(ref transport) => Ok(Arc::clone(transport)),
            None => ReqwestTransport::with_timeout(self.timeout)
                .map(|t| Arc::new(t) as Arc<dyn HttpTransport>)
                .map_err(|e| PlatformError::internal(e.to_string())),
        }
    }

    /// Resolve the host for `kind`: explicit argument, then configured host,
    /// then the public default.
    pub fn resolve_host(&self, kind: ProviderKind, host: Option<&str>) -> String {
        let configured = self.credentials.get(&kind).and_then(|c| c.host.as_deref());
        normalize_host(host.or(configured).unwrap_or(kind.default_host()))
    }

    fn token(&self, kind: ProviderKind) -> Option<String> {
        self.credentials.get(&kind).and_then(|c| c.token.clone())
    }
}

#[allow(dead_code)]
fn not_compiled(kind: ProviderKind) -> PlatformError {
    PlatformError::internal(format!("{kind} support was not compiled in"))
}

impl ClientFactory for HttpClientFactory {
    fn create(&self, kind: ProviderKind, host: Option<&str>) -> Result<Arc<dyn ProviderClient>> {
        let host = self.resolve_host(kind, host);
        let limiter = self.limiters.for_host(kind, &host);
        let token = self.token(kind);

        tracing::debug!(provider = %kind, host = %host, authenticated = token.is_some(), "Creating provider client");

        match kind {
            #[cfg(feature = "github")]
            ProviderKind::GitHub => Ok(Arc::new(crate::github::GitHubClient::new_with_transport(
                &host,
                token.as_deref(),
                limiter,
                self.transport()?,
            ))),
            #[cfg(feature = "gitlab")]
            ProviderKind::GitLab => Ok(Arc::new(crate::gitlab::GitLabClient::new_with_transport(
                &host,
                token.as_deref(),
                limiter,
                self.transport()?,
            ))),
            #[cfg(feature = "gitea")]
            ProviderKind::Gitea | ProviderKind::Gogs => {
                let flavor = if kind == ProviderKind::Gogs {
                    crate::gitea::Flavor::Gogs
                } else {
                    crate::gitea::Flavor::Gitea
                };
                Ok(Arc::new(crate::gitea::GiteaClient::new_with_transport(
                    &host,
                    token.as_deref(),
                    flavor,
                    limiter,
                    self.transport()?,
                )))
            }
            #[cfg(not(feature = "github"))]
            ProviderKind::GitHub => Err(not_compiled(kind)),
            #[cfg(not(feature = "gitlab"))]
            ProviderKind::GitLab => Err(not_compiled(kind)),
            #[cfg(not(feature = "gitea"))]
            ProviderKind::Gitea | ProviderKind::Gogs => Err(not_compiled(kind)),
        }
    }
}
