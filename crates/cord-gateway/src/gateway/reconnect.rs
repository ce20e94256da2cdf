//! Reconnection pacing and backoff.

use std::time::Duration;

/// Timing rules for re-establishing a session's socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// A socket younger than this is not replaced until it reaches this age.
    pub settle_window: Duration,
    /// Minimum wait before the first attempt.
    pub min_delay: Duration,
    /// Backoff unit; the wait after the n-th failure is `base * n²`.
    pub backoff_base: Duration,
    /// Consecutive failed attempts after which the session fails.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            settle_window: Duration::from_millis(5_500),
            min_delay: Duration::from_millis(100),
            backoff_base: Duration::from_millis(400),
            max_attempts: 4,
        }
    }
}

impl ReconnectPolicy {
    /// Wait before the first attempt, given how long ago the discarded
    /// socket was opened.
    #[must_use]
    pub fn initial_delay(&self, since_last_connect: Duration) -> Duration {
        self.settle_window
            .saturating_sub(since_last_connect)
            .max(self.min_delay)
    }

    /// Wait after `failures` consecutive failed attempts.
    #[must_use]
    pub fn delay_for_failure(&self, failures: u32) -> Duration {
        self.backoff_base
            .saturating_mul(failures.saturating_mul(failures))
    }

    /// Whether another attempt is allowed after `failures` failures.
    #[must_use]
    pub const fn should_retry(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}
