//! Reconnection delay policies

use std::time::Duration;

/// Decides how long to wait before the next connect attempt
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before retrying after `failure_count` consecutive failures (1-based)
    fn next_attempt(&self, failure_count: u32) -> Duration;
}

/// Same delay every time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_attempt(&self, _failure_count: u32) -> Duration {
        self.delay
    }
}

/// Doubling delay, capped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_attempt(&self, failure_count: u32) -> Duration {
        // Cap the exponent so the multiplier cannot overflow
        let exponent = failure_count.saturating_sub(1).min(10);
        self.base
            .checked_mul(2_u32.pow(exponent))
            .unwrap_or(self.max)
            .min(self.max)
    }
}

/// Failure bookkeeping between connect attempts
#[derive(Debug, Clone, Default)]
pub struct ReconnectState {
    /// Consecutive failed attempts since the last success
    failures: u32,
    /// Successful reconnects over the daemon's lifetime
    reconnects: u32,
}

impl ReconnectState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed attempt and return the new failure count
    pub fn record_failure(&mut self) -> u32 {
        self.failures = self.failures.saturating_add(1);
        self.failures
    }

    /// Record a successful connect
    pub fn record_success(&mut self, was_reconnect: bool) {
        self.failures = 0;
        if was_reconnect {
            self.reconnects += 1;
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }
}
