//! Error types
//!
//! One error enum for the crate. Each variant maps to an [`ErrorClass`]; the
//! orchestrator reads the class to decide whether a failed step is backed
//! off and retried or ends the target's run. Nothing else inspects it.

use thiserror::Error;

/// Retry decision for an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Back off and repeat the step
    Retryable,
    /// Stop this target
    Fatal,
}

#[derive(Error, Debug)]
pub enum Error {
    // Setup
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid config value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Invalid scrape target '{value}': {message}")]
    InvalidTarget { value: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Config file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    // Provider
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("OAuth2 error: {message}")]
    OAuth2 { message: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Access token rejected: {body}")]
    TokenRejected { body: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Undecodable listing: {message}")]
    Decode { message: String },

    #[error("Pagination stalled: provider returned cursor '{cursor}' again")]
    PaginationStalled { cursor: String },

    // Storage
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Checkpoint store error: {message}")]
    Checkpoint { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invalid_target(value: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidTarget {
            value: value.into(),
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    /// Transport trouble, provider throttling, a rejected cached token and
    /// transient database failures are retryable. Everything else,
    /// including any other 4xx and every configuration or credential
    /// problem, is fatal.
    pub fn class(&self) -> ErrorClass {
        let retryable = match self {
            Error::Http(e) => !(e.is_builder() || e.is_redirect()),
            Error::RateLimited { .. }
            | Error::Timeout { .. }
            | Error::Decode { .. }
            | Error::TokenRejected { .. } => true,
            Error::HttpStatus { status, .. } => is_retryable_status(*status),
            Error::Database(e) => is_transient_db_error(e),
            _ => false,
        };
        if retryable {
            ErrorClass::Retryable
        } else {
            ErrorClass::Fatal
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn is_transient_db_error(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Io(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_transient_sqlstate(&code)),
        _ => false,
    }
}

/// Connection exceptions (08), operator intervention (57P), serialization
/// failure and deadlock
fn is_transient_sqlstate(code: &str) -> bool {
    code.starts_with("08") || code.starts_with("57P") || matches!(code, "40001" | "40P01")
}

pub type Result<T> = std::result::Result<T, Error>;

/// Prefix an error with what was being attempted.
///
/// The result is [`Error::Other`], which is always fatal; use it only at the
/// edges where no retry decision follows.
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other(format!("{}: {}", message.into(), e.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_display() {
        assert_eq!(
            Error::missing_field("api.client_id").to_string(),
            "Missing required config field: api.client_id"
        );
        assert_eq!(Error::http_status(404, "Not found").to_string(), "HTTP 404: Not found");
        assert_eq!(
            Error::PaginationStalled {
                cursor: "t3_abc".to_string()
            }
            .to_string(),
            "Pagination stalled: provider returned cursor 't3_abc' again"
        );
    }

    #[test_case(429, ErrorClass::Retryable ; "too many requests")]
    #[test_case(500, ErrorClass::Retryable ; "internal error")]
    #[test_case(503, ErrorClass::Retryable ; "unavailable")]
    #[test_case(522, ErrorClass::Retryable ; "cloudflare timeout")]
    #[test_case(400, ErrorClass::Fatal ; "bad request")]
    #[test_case(401, ErrorClass::Fatal ; "unauthorized")]
    #[test_case(403, ErrorClass::Fatal ; "forbidden")]
    #[test_case(404, ErrorClass::Fatal ; "not found")]
    fn test_http_status_class(status: u16, expected: ErrorClass) {
        assert_eq!(Error::http_status(status, "").class(), expected);
    }

    #[test]
    fn test_variant_classes() {
        let retryable = [
            Error::RateLimited {
                retry_after_seconds: 60,
            },
            Error::Timeout { timeout_ms: 1000 },
            Error::decode("truncated body"),
            Error::TokenRejected {
                body: "expired".to_string(),
            },
            Error::Database(sqlx::Error::PoolTimedOut),
        ];
        for err in &retryable {
            assert!(err.is_retryable(), "{err}");
        }

        let fatal = [
            Error::config("bad"),
            Error::auth("bad credentials"),
            Error::checkpoint("unwritable"),
            Error::Database(sqlx::Error::RowNotFound),
            Error::PaginationStalled {
                cursor: "t3_abc".to_string(),
            },
        ];
        for err in &fatal {
            assert_eq!(err.class(), ErrorClass::Fatal, "{err}");
        }
    }

    #[test_case("08006", true ; "connection failure")]
    #[test_case("40001", true ; "serialization failure")]
    #[test_case("40P01", true ; "deadlock")]
    #[test_case("57P01", true ; "admin shutdown")]
    #[test_case("23505", false ; "unique violation")]
    #[test_case("42P01", false ; "undefined table")]
    fn test_sqlstate_classification(code: &str, transient: bool) {
        assert_eq!(is_transient_sqlstate(code), transient);
    }

    #[test]
    fn test_context_prefixes_and_is_fatal() {
        let result: Result<()> = Err(Error::decode("inner"));
        let err = result.context("creating tables").unwrap_err();
        assert_eq!(err.to_string(), "creating tables: Undecodable listing: inner");
        assert!(!err.is_retryable());
    }
}
