//! Token cache and request signing

use super::types::{AuthConfig, CachedToken, OAuthClient};
use crate::error::{Error, Result};
use crate::http::{retry_after_secs, truncate_body};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Signs requests, fetching and caching OAuth2 tokens as needed.
///
/// The cache lock is held across a refresh so concurrent targets wait for
/// one token request instead of each sending their own.
pub struct Authenticator {
    config: AuthConfig,
    token: Mutex<Option<CachedToken>>,
    http_client: Client,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Token requests go through `http_client`, picking up its user agent
    pub fn with_client(config: AuthConfig, http_client: Client) -> Self {
        Self {
            config,
            token: Mutex::new(None),
            http_client,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Add credentials to a request
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match &self.config {
            AuthConfig::None => Ok(req),
            AuthConfig::Bearer { token } => Ok(req.bearer_auth(token)),
            AuthConfig::OAuth2 { .. } => Ok(req.bearer_auth(self.access_token().await?)),
        }
    }

    /// Obtain a token now so bad credentials show up before any run starts
    pub async fn check(&self) -> Result<()> {
        match &self.config {
            AuthConfig::OAuth2 { .. } => self.access_token().await.map(drop),
            _ => Ok(()),
        }
    }

    /// Forget the cached token; the next request fetches a new one
    pub async fn clear_cache(&self) {
        *self.token.lock().await = None;
    }

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        let AuthConfig::OAuth2 { client, grant } = &self.config else {
            return Err(Error::auth("no token endpoint configured"));
        };

        let mut form = grant.form();
        if !client.scopes.is_empty() {
            form.push(("scope", client.scopes.join(" ")));
        }

        debug!(grant = grant.as_str(), "Requesting access token");
        let response = self.post_form(client, &form).await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = retry_after_secs(&response);
            warn!(retry_after, "Token endpoint rate limited (429)");
            return Err(Error::RateLimited {
                retry_after_seconds: retry_after,
            });
        }
        if !status.is_success() {
            let body = truncate_body(response.text().await.unwrap_or_default());
            // An unavailable endpoint says nothing about the credentials
            if status.is_server_error() {
                warn!(status = status.as_u16(), "Token endpoint unavailable");
                return Err(Error::http_status(status.as_u16(), body));
            }
            return Err(Error::OAuth2 {
                message: format!("token endpoint returned {}: {body}", status.as_u16()),
            });
        }

        let body: TokenResponse = response.json().await?;
        // Bad credentials come back as 200 with an error field
        if let Some(error) = body.error {
            return Err(Error::OAuth2 {
                message: format!("token request rejected: {error}"),
            });
        }

        let token = body
            .into_cached_token()
            .ok_or_else(|| Error::auth("token response has no access_token"))?;
        info!(grant = grant.as_str(), "Obtained access token");
        Ok(token)
    }

    async fn post_form(
        &self,
        client: &OAuthClient,
        form: &[(&'static str, String)],
    ) -> Result<reqwest::Response> {
        Ok(self
            .http_client
            .post(&client.token_url)
            .basic_auth(&client.client_id, Some(&client.client_secret))
            .form(form)
            .send()
            .await?)
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

impl TokenResponse {
    fn into_cached_token(self) -> Option<CachedToken> {
        let token = self.access_token.filter(|t| !t.is_empty())?;
        Some(match self.expires_in {
            Some(secs) => CachedToken::expires_in(token, secs),
            None => CachedToken::new(token, None),
        })
    }
}
