//! Authentication module
//!
//! Anonymous, static bearer, or OAuth2 (client credentials or password
//! grant). OAuth2 tokens are cached until shortly before they expire and
//! dropped when the API answers 401.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, CachedToken, Grant, OAuthClient};
