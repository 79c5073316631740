//! Listing transport
//!
//! A thin GET-and-decode client. Every request waits on the shared rate
//! limiter, carries the OAuth2 bearer token and has its outcome mapped onto
//! an [`Error`] whose class tells the orchestrator whether to back off.
//! Nothing is retried here.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::{AuthConfig, Authenticator};
use crate::error::{Error, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Wait assumed when a 429 names none
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Error bodies are cut to this many bytes
const MAX_ERROR_BODY: usize = 512;

/// Transport settings
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix for relative paths
    pub base_url: Option<String>,
    /// Per-request timeout
    pub timeout: Duration,
    /// Local request budget; `None` sends as fast as the provider allows
    pub rate_limit: Option<RateLimiterConfig>,
    /// Sent on every request, token requests included
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(30),
            rate_limit: Some(RateLimiterConfig::default()),
            user_agent: format!("reddit-ingest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Start from the defaults
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }
}

/// Builder for [`HttpClientConfig`]
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Rate-limited, authenticated GET client.
///
/// Clones share the connection pool, the token cache and the limiter, so a
/// single client serves every concurrent target.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: Arc<HttpClientConfig>,
    authenticator: Option<Arc<Authenticator>>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Build a client without credentials
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::config(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            rate_limiter: config.rate_limit.as_ref().map(RateLimiter::new),
            config: Arc::new(config),
            authenticator: None,
        })
    }

    /// Build a client whose token requests share its connection pool and
    /// user agent
    pub fn with_auth(config: HttpClientConfig, auth_config: AuthConfig) -> Result<Self> {
        let mut http = Self::with_config(config)?;
        http.authenticator = Some(Arc::new(Authenticator::with_client(
            auth_config,
            http.client.clone(),
        )));
        Ok(http)
    }

    pub fn rate_limiter(&self) -> Option<&RateLimiter> {
        self.rate_limiter.as_ref()
    }

    pub fn authenticator(&self) -> Option<&Authenticator> {
        self.authenticator.as_deref()
    }

    /// GET `path` with `query` and decode the body.
    ///
    /// A body that is not valid JSON is a [`Error::Decode`], which the
    /// engine retries: the listing endpoints answer with HTML error pages
    /// under load.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self.get(path, query).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| Error::decode(format!("{path}: {e}")))
    }

    /// GET `path` and map the status onto an error
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        let url = self.url(path);

        if let Some(limiter) = &self.rate_limiter {
            limiter.acquire().await;
        }

        let mut request = self.client.get(&url);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(auth) = &self.authenticator {
            request = match auth.apply(request).await {
                Ok(request) => request,
                Err(err) => {
                    if let (Error::RateLimited { retry_after_seconds }, Some(limiter)) =
                        (&err, &self.rate_limiter)
                    {
                        limiter.observe_retry_after(Duration::from_secs(*retry_after_seconds));
                    }
                    return Err(err);
                }
            };
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                warn!(%url, "Request timed out");
                Error::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                }
            } else {
                warn!(%url, error = %e, "Request failed");
                Error::Http(e)
            }
        })?;

        if let Some(limiter) = &self.rate_limiter {
            limiter.observe(response.headers());
        }
        self.check_status(&url, response).await
    }

    async fn check_status(&self, url: &str, response: Response) -> Result<Response> {
        let status = response.status();

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = retry_after_secs(&response);
                warn!(%url, retry_after, "Rate limited (429)");
                if let Some(limiter) = &self.rate_limiter {
                    limiter.observe_retry_after(Duration::from_secs(retry_after));
                }
                Err(Error::RateLimited {
                    retry_after_seconds: retry_after,
                })
            }
            s if s.is_client_error() || s.is_server_error() => {
                let body = truncate_body(response.text().await.unwrap_or_default());
                if s == StatusCode::UNAUTHORIZED {
                    if let Some(auth) = self.refreshable_authenticator() {
                        // Revoked or early-expired; the retry fetches a new token
                        auth.clear_cache().await;
                        warn!(%url, "Access token rejected, dropping cached token");
                        return Err(Error::TokenRejected { body });
                    }
                }
                warn!(%url, status = s.as_u16(), "Request rejected");
                Err(Error::http_status(s.as_u16(), body))
            }
            s => {
                debug!(%url, status = s.as_u16(), "GET ok");
                Ok(response)
            }
        }
    }

    /// The authenticator, if it can obtain a replacement token
    fn refreshable_authenticator(&self) -> Option<&Authenticator> {
        self.authenticator
            .as_deref()
            .filter(|auth| matches!(auth.config(), AuthConfig::OAuth2 { .. }))
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match &self.config.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.config.base_url)
            .field("auth", &self.authenticator.as_ref().map(|a| a.config().kind()))
            .field("rate_limited", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// Seconds from a `Retry-After` header; fractional values round up
pub(crate) fn retry_after_secs(response: &Response) -> u64 {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map_or(DEFAULT_RETRY_AFTER_SECS, |secs| secs.ceil() as u64)
}

pub(crate) fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}
