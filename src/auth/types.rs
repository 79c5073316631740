//! Credential and token types

use chrono::{DateTime, Duration, Utc};

/// Tokens this close to expiry are refreshed before use
const EXPIRY_MARGIN_SECS: i64 = 30;

/// How requests are authenticated
#[derive(Clone, Default)]
pub enum AuthConfig {
    /// Anonymous access
    #[default]
    None,

    /// Pre-issued access token
    Bearer { token: String },

    /// Token obtained from the provider's OAuth2 endpoint
    OAuth2 { client: OAuthClient, grant: Grant },
}

impl AuthConfig {
    /// Application-only OAuth2
    pub fn client_credentials(client: OAuthClient) -> Self {
        Self::OAuth2 {
            client,
            grant: Grant::ClientCredentials,
        }
    }

    /// OAuth2 acting as a script account
    pub fn password(
        client: OAuthClient,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self::OAuth2 {
            client,
            grant: Grant::Password {
                username: username.into(),
                password: password.into(),
            },
        }
    }

    /// Short name of the flow, safe to log
    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::None => "none",
            AuthConfig::Bearer { .. } => "bearer",
            AuthConfig::OAuth2 { grant, .. } => grant.as_str(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("kind", &self.kind())
            .finish_non_exhaustive()
    }
}

/// Registered OAuth2 application
#[derive(Clone)]
pub struct OAuthClient {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

impl OAuthClient {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

/// OAuth2 grant type
#[derive(Clone)]
pub enum Grant {
    ClientCredentials,
    Password { username: String, password: String },
}

impl Grant {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grant::ClientCredentials => "client_credentials",
            Grant::Password { .. } => "password",
        }
    }

    /// Form fields identifying the grant
    pub(crate) fn form(&self) -> Vec<(&'static str, String)> {
        let mut form = vec![("grant_type", self.as_str().to_string())];
        if let Grant::Password { username, password } = self {
            form.push(("username", username.clone()));
            form.push(("password", password.clone()));
        }
        form
    }
}

/// Access token held between requests
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    /// `None` for tokens the provider issued without a lifetime
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// Token valid for `seconds` from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        Self::new(token, Some(Utc::now() + Duration::seconds(seconds)))
    }

    /// Expired, or about to be
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| Utc::now() + Duration::seconds(EXPIRY_MARGIN_SECS) >= at)
    }
}
