//! Configuration for ingestion runs
//!
//! A YAML file provides every setting; all fields have defaults except the
//! API credentials. Environment variables are applied on top once at
//! startup (`.env` files are loaded by the binary before this runs).

use crate::auth::{AuthConfig, OAuthClient};
use crate::engine::{RetryPolicy, RunConfig};
use crate::error::{Error, Result};
use crate::http::RateLimiterConfig;
use crate::pagination::MAX_PAGE_SIZE;
use crate::types::{ItemKind, ScrapeTarget};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "reddit-ingest.yaml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete configuration loaded from YAML and the environment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Provider API settings
    #[serde(default)]
    pub api: ApiConfig,

    /// Static request budget
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Record and checkpoint storage
    #[serde(default)]
    pub store: StoreConfig,

    /// Batching and retry behavior
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Targets as `source:kind`, or a bare source for posts and comments
    #[serde(default)]
    pub targets: Vec<String>,
}

impl Config {
    /// Load configuration and apply environment overrides.
    ///
    /// With no path, `reddit-ingest.yaml` in the working directory is used
    /// if present; otherwise defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a YAML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                Error::config(format!(
                    "Failed to read config file '{}': {e}",
                    path.display()
                ))
            }
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a YAML config document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Apply overrides from an environment lookup
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = var("REDDIT_CLIENT_ID") {
            self.api.client_id = Some(v);
        }
        if let Some(v) = var("REDDIT_CLIENT_SECRET") {
            self.api.client_secret = Some(v);
        }
        if let Some(v) = var("REDDIT_USER_AGENT") {
            self.api.user_agent = v;
        }
        if let Some(v) = var("REDDIT_USERNAME") {
            self.api.username = Some(v);
        }
        if let Some(v) = var("REDDIT_PASSWORD") {
            self.api.password = Some(v);
        }
        if let Some(v) = var("DATABASE_URL") {
            self.store.database_url = Some(v);
        }
        if let Some(v) = var("SUBREDDITS") {
            self.targets = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(rpm) = var("REQUESTS_PER_MINUTE").and_then(|v| v.parse().ok()) {
            self.rate_limit.requests_per_minute = rpm;
        } else if let Some(secs) = var("RATE_LIMIT").and_then(|v| v.parse::<u32>().ok()) {
            // Seconds between requests
            self.rate_limit.requests_per_minute = (60 / secs.max(1)).max(1);
        }
    }

    /// Check the config is usable. The store URL is only required when
    /// records are written to Postgres.
    pub fn validate(&self, require_store: bool) -> Result<()> {
        if self.targets.is_empty() {
            return Err(Error::invalid_value("targets", "at least one target is required"));
        }
        self.targets()?;

        if self.api.client_id.is_none() {
            return Err(Error::missing_field("api.client_id"));
        }
        if self.api.client_secret.is_none() {
            return Err(Error::missing_field("api.client_secret"));
        }
        if self.api.username.is_some() != self.api.password.is_some() {
            return Err(Error::invalid_value(
                "api.username",
                "username and password must be set together",
            ));
        }
        if self.api.user_agent.trim().is_empty() {
            return Err(Error::missing_field("api.user_agent"));
        }
        Url::parse(&self.api.base_url)?;
        Url::parse(&self.api.token_url)?;

        if self.rate_limit.requests_per_minute == 0 {
            return Err(Error::invalid_value("rate_limit.requests_per_minute", "must be > 0"));
        }
        if self.rate_limit.burst == 0 {
            return Err(Error::invalid_value("rate_limit.burst", "must be > 0"));
        }

        let pipeline = &self.pipeline;
        if pipeline.page_size == 0 || pipeline.page_size > MAX_PAGE_SIZE {
            return Err(Error::invalid_value(
                "pipeline.page_size",
                format!("must be between 1 and {MAX_PAGE_SIZE}"),
            ));
        }
        if pipeline.backoff_cap_ms < pipeline.backoff_base_ms {
            return Err(Error::invalid_value(
                "pipeline.backoff_cap_ms",
                "must not be below backoff_base_ms",
            ));
        }
        if pipeline.concurrency == 0 {
            return Err(Error::invalid_value("pipeline.concurrency", "must be > 0"));
        }
        if pipeline.max_pages == Some(0) {
            return Err(Error::invalid_value("pipeline.max_pages", "must be > 0"));
        }

        if require_store && self.store.database_url.is_none() {
            return Err(Error::missing_field("store.database_url"));
        }
        Ok(())
    }

    /// Parsed targets, deduplicated in order
    pub fn targets(&self) -> Result<Vec<ScrapeTarget>> {
        let mut targets: Vec<ScrapeTarget> = Vec::new();
        for spec in &self.targets {
            let parsed = if spec.contains(':') {
                vec![spec.parse::<ScrapeTarget>()?]
            } else {
                ItemKind::ALL
                    .iter()
                    .map(|kind| format!("{spec}:{kind}").parse())
                    .collect::<Result<Vec<_>>>()?
            };
            for target in parsed {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        Ok(targets)
    }

    /// Credentials flow implied by the API settings
    pub fn auth_config(&self) -> AuthConfig {
        let api = &self.api;
        let (Some(client_id), Some(client_secret)) = (&api.client_id, &api.client_secret) else {
            return AuthConfig::None;
        };
        let client = OAuthClient::new(&api.token_url, client_id, client_secret)
            .with_scopes(api.scopes.clone());
        match (&api.username, &api.password) {
            (Some(username), Some(password)) => AuthConfig::password(client, username, password),
            _ => AuthConfig::client_credentials(client),
        }
    }

    /// Orchestrator settings
    pub fn run_config(&self) -> RunConfig {
        let pipeline = &self.pipeline;
        RunConfig::new()
            .with_retry(RetryPolicy::new(
                pipeline.max_attempts,
                Duration::from_millis(pipeline.backoff_base_ms),
                Duration::from_millis(pipeline.backoff_cap_ms),
            ))
            .with_max_pages(pipeline.max_pages)
            .with_incremental(pipeline.incremental)
    }
}

// ============================================================================
// API
// ============================================================================

/// Provider API settings
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL for listing requests
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// OAuth2 token endpoint
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// OAuth2 client id
    #[serde(default)]
    pub client_id: Option<String>,

    /// OAuth2 client secret
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Account name; with `password` switches to the password grant
    #[serde(default)]
    pub username: Option<String>,

    /// Account password
    #[serde(default)]
    pub password: Option<String>,

    /// OAuth2 scopes
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// User agent sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Request timeout
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_url: default_token_url(),
            client_id: None,
            client_secret: None,
            username: None,
            password: None,
            scopes: default_scopes(),
            user_agent: default_user_agent(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .field("username", &self.username)
            .field("password", &redact(&self.password))
            .field("scopes", &self.scopes)
            .field("user_agent", &self.user_agent)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

fn default_base_url() -> String {
    "https://oauth.reddit.com".to_string()
}

fn default_token_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["read".to_string()]
}

fn default_user_agent() -> String {
    concat!("reddit-ingest/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_timeout() -> u64 {
    30
}

// ============================================================================
// Rate Limit
// ============================================================================

/// Static request budget, refined at runtime by provider headers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests per minute across all targets
    #[serde(default = "default_rpm")]
    pub requests_per_minute: u32,

    /// Requests allowed back to back
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_rpm(),
            burst: default_burst(),
        }
    }
}

impl RateLimitConfig {
    /// Limiter settings
    pub fn limiter_config(&self) -> RateLimiterConfig {
        RateLimiterConfig::new(self.requests_per_minute, self.burst)
    }
}

fn default_rpm() -> u32 {
    60
}

fn default_burst() -> u32 {
    5
}

// ============================================================================
// Store
// ============================================================================

/// Where checkpoints are kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointBackend {
    /// `scrape_checkpoints` table next to the records
    #[default]
    Postgres,
    /// JSON file at `checkpoint_path`
    File,
}

/// Record and checkpoint storage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Postgres connection string
    #[serde(default)]
    pub database_url: Option<String>,

    /// Pool size shared by all targets
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Checkpoint backend
    #[serde(default)]
    pub checkpoints: CheckpointBackend,

    /// Checkpoint file for the file backend
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
            checkpoints: CheckpointBackend::default(),
            checkpoint_path: default_checkpoint_path(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from("checkpoints.json")
}

// ============================================================================
// Pipeline
// ============================================================================

/// Batching and retry behavior
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Items per page; one page is one batch and one checkpoint
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Backoffs allowed per step before a target fails
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff delay
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Largest backoff delay
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,

    /// Pages per target per run (unbounded if unset)
    #[serde(default)]
    pub max_pages: Option<usize>,

    /// Targets processed at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// After a completed pass, stop at the first page with nothing new
    #[serde(default)]
    pub incremental: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            max_pages: None,
            concurrency: default_concurrency(),
            incremental: false,
        }
    }
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    500
}

fn default_backoff_cap_ms() -> u64 {
    60_000
}

fn default_concurrency() -> usize {
    4
}
