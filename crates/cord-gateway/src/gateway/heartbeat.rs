//! Heartbeat interval negotiation and the per-socket heartbeat timer.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Bounds applied to the interval requested by HELLO.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPolicy {
    /// Shortest interval accepted.
    pub min_interval: Duration,
    /// Longest interval accepted.
    pub max_interval: Duration,
    /// Interval used when HELLO carries no usable value.
    pub default_interval: Duration,
}

impl Default for HeartbeatPolicy {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(1000),
            max_interval: Duration::from_millis(55_000),
            default_interval: Duration::from_millis(30_000),
        }
    }
}

impl HeartbeatPolicy {
    /// Effective interval for a HELLO that requested `requested_ms`.
    ///
    /// Missing or zero values fall back to the default; the result is
    /// raised to the floor first and then capped at the ceiling.
    #[must_use]
    pub fn interval_for(&self, requested_ms: Option<i64>) -> Duration {
        let min = self.min_interval.as_millis() as i64;
        let max = self.max_interval.as_millis() as i64;
        let default = self.default_interval.as_millis() as i64;

        let ms = requested_ms.filter(|ms| *ms != 0).unwrap_or(default);
        Duration::from_millis(ms.max(min).min(max).max(0) as u64)
    }
}

/// Heartbeat timer for one socket.
///
/// Owned by the connection it belongs to, so discarding the connection
/// stops the timer.
#[derive(Debug)]
pub struct Heartbeat {
    interval: Interval,
    acknowledged: bool,
}

impl Heartbeat {
    /// Start a timer whose first tick is one `period` from now.
    #[must_use]
    pub fn start(period: Duration) -> Self {
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            interval,
            acknowledged: true,
        }
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) {
        self.interval.tick().await;
    }

    /// Record that the server acknowledged the last heartbeat.
    pub fn acknowledge(&mut self) {
        self.acknowledged = true;
    }

    /// Called on each tick. Returns `false` if the previous heartbeat was
    /// never acknowledged, meaning the connection is presumed dead;
    /// otherwise marks a new heartbeat as outstanding.
    pub fn beat(&mut self) -> bool {
        if !self.acknowledged {
            return false;
        }
        self.acknowledged = false;
        true
    }
}
