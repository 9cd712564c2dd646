//! Exponential backoff for transient store and side-channel failures.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry settings, in milliseconds so they read naturally from config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retry attempts per event (not counting the first try).
    /// `0` retries forever.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    /// Caps exponential growth.
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

/// Stateless policy: computes the delay before a given retry.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Delay before the `attempt`-th retry (1-based), or `None` once the
    /// retry budget is spent.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        let exp = attempt.saturating_sub(1).min(64) as i32;
        let base_ms = self.config.initial_backoff_ms as f64 * self.config.multiplier.powi(exp);
        let capped = base_ms.min(self.config.max_backoff_ms as f64);
        Some(Duration::from_millis(capped as u64))
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        self.config.max_retries == 0 || attempt <= self.config.max_retries
    }
}
