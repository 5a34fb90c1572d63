//! Timeout configuration for sync-core operations.

use std::time::Duration;

/// Bounded waits used across the sync core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncTimeouts {
    /// Bounded wait for the transport's `Subscribed` acknowledgment after
    /// opening a channel. Default: 10 seconds.
    pub subscribe_timeout: Duration,

    /// How long a zero-refcount registry entry lingers before teardown, to
    /// absorb rapid attach/detach churn. Default: 100 milliseconds.
    pub teardown_debounce: Duration,

    /// Bounded wait for a presence channel join. Default: 5 seconds.
    pub presence_join_timeout: Duration,
}

impl Default for SyncTimeouts {
    fn default() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(10),
            teardown_debounce: Duration::from_millis(100),
            presence_join_timeout: Duration::from_secs(5),
        }
    }
}

impl SyncTimeouts {
    /// Short timeouts suitable for local development and tests.
    pub fn fast() -> Self {
        Self {
            subscribe_timeout: Duration::from_secs(2),
            teardown_debounce: Duration::from_millis(100),
            presence_join_timeout: Duration::from_secs(1),
        }
    }

    /// Set the subscribe-ack timeout.
    pub fn with_subscribe_timeout(mut self, timeout: Duration) -> Self {
        self.subscribe_timeout = timeout;
        self
    }

    /// Set the teardown debounce window.
    pub fn with_teardown_debounce(mut self, window: Duration) -> Self {
        self.teardown_debounce = window;
        self
    }
}
