//! HTTP client module
//!
//! Provides the HTTP transport for listing requests.
//!
//! # Features
//!
//! - **Rate Limiting**: Token bucket limiter using governor, overridden by
//!   the provider's own quota headers while they are fresh
//! - **Error Classification**: 429/5xx/timeouts map to retryable errors,
//!   other 4xx to fatal ones
//! - **Authentication**: Integration with auth module

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder};
pub(crate) use client::{retry_after_secs, truncate_body};
pub use rate_limit::{
    ProviderQuota, RateLimiter, RateLimiterConfig, REMAINING_HEADER, RESET_HEADER, USED_HEADER,
};
