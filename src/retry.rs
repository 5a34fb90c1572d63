//! Retry/backoff policy for feed subscriptions.
//!
//! Delay for retry attempt `n` (1-indexed) is
//! `min(max_delay, base * 2^(n-1)) + jitter`, with jitter a uniform value in
//! `[0, 1s)` derived from a stable hash of the subscription key and attempt
//! index: deterministic per attempt, so reconnect storms still spread out
//! without an RNG dependency.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

/// Width of the jitter window added to every backoff delay.
const JITTER_SPAN_MS: u64 = 1_000;

/// Retry policy for a connection supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryOptions {
    /// Base delay before the first retry.
    /// Default: 1000ms (1 second); doubles each attempt.
    pub base_delay_ms: u64,

    /// Cap on the exponential backoff delay (jitter excluded).
    /// Default: 30000ms (30 seconds).
    pub max_delay_ms: u64,

    /// Retry attempts before the supervisor gives up and settles at
    /// `Disconnected`. Default: 5.
    pub max_attempts: u32,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl RetryOptions {
    /// Set the base delay in milliseconds.
    pub fn with_base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    /// Set the backoff cap in milliseconds.
    pub fn with_max_delay_ms(mut self, ms: u64) -> Self {
        self.max_delay_ms = ms;
        self
    }

    /// Set the maximum retry attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Backoff component for retry `attempt` (1-indexed), jitter excluded.
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let exp = attempt.saturating_sub(1).min(31);
        let doubled = self.base_delay_ms.saturating_mul(1u64 << exp);
        doubled.min(self.max_delay_ms)
    }

    /// Full delay before retry `attempt` (1-indexed): backoff plus jitter.
    pub fn delay_for_attempt(&self, key: &str, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms(attempt)) + retry_jitter(key, attempt)
    }
}

/// Uniform jitter in `[0, 1s)` from a stable hash of `(key, attempt)`.
fn retry_jitter(key: &str, attempt: u32) -> Duration {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    attempt.hash(&mut hasher);
    Duration::from_millis(hasher.finish() % JITTER_SPAN_MS)
}
