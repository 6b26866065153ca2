//! Reconnection policy
//!
//! Capped exponential backoff with round-robin endpoint selection:
//! `delay = min(base * 2^(failures - 1), max)`.

use std::time::Duration;

use crate::config::ClientConfig;

/// Backoff settings
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Consecutive failures tolerated before giving up
    pub max_attempts: u32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl From<&ClientConfig> for BackoffConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            base_delay: config.backoff_base,
            max_delay: config.backoff_max,
            max_attempts: config.max_reconnect_attempts,
        }
    }
}

/// Retry decision state for one client
///
/// The endpoint index survives successful connections so a healthy endpoint
/// keeps being used; only failures advance it.
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: BackoffConfig,
    endpoints: Vec<String>,
    endpoint_index: usize,
    failures: u32,
    current_delay: Duration,
}

impl ReconnectPolicy {
    /// Create a policy over a non-empty endpoint list
    pub fn new(config: BackoffConfig, endpoints: Vec<String>) -> Self {
        let current_delay = config.base_delay;
        Self {
            config,
            endpoints,
            endpoint_index: 0,
            failures: 0,
            current_delay,
        }
    }

    /// Endpoint the next attempt should dial
    pub fn current_endpoint(&self) -> &str {
        self.endpoints
            .get(self.endpoint_index)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn endpoint_index(&self) -> usize {
        self.endpoint_index
    }

    /// Move to the next endpoint, wrapping around
    pub fn advance_endpoint(&mut self) {
        if !self.endpoints.is_empty() {
            self.endpoint_index = (self.endpoint_index + 1) % self.endpoints.len();
        }
    }

    /// Record a failure and return the delay before the next attempt
    ///
    /// Returns `None` once the failure count exceeds the ceiling; the policy
    /// stays exhausted until [`reset`](Self::reset).
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.failures = self.failures.saturating_add(1);
        if self.failures > self.config.max_attempts {
            return None;
        }

        let exponent = (self.failures - 1).min(31);
        let base_ms = self.config.base_delay.as_millis() as u64;
        let max_ms = self.config.max_delay.as_millis() as u64;
        let delay_ms = base_ms.saturating_mul(1u64 << exponent).min(max_ms);

        self.current_delay = Duration::from_millis(delay_ms);
        Some(self.current_delay)
    }

    /// Clear failures after a successful open
    pub fn reset(&mut self) {
        self.failures = 0;
        self.current_delay = self.config.base_delay;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn is_exhausted(&self) -> bool {
        self.failures > self.config.max_attempts
    }
}
