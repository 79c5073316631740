//! Exponential backoff with jitter

use std::time::Duration;

/// Bounded exponential backoff.
///
/// The `n`th backoff of a step (counting from 0) waits a random duration in
/// `[d/2, d]` where `d = min(base * 2^n, cap)`. A step may back off
/// `max_attempts` times; the next retryable failure fails the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoffs allowed per step
    pub max_attempts: u32,
    /// First delay
    pub base: Duration,
    /// Largest delay
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base: Duration::from_millis(500),
            cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Create a policy
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts,
            base,
            cap,
        }
    }

    /// Upper bound of the delay before retry `attempt`
    pub fn delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Delay before retry `attempt`, jittered into `[delay/2, delay]`
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.delay(attempt);
        let floor = delay / 2;
        floor + (delay - floor).mul_f64(fastrand::f64())
    }

    /// Check if another backoff is allowed after `attempts` backoffs
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
