//! Exponential backoff between attempts on the same credential.

use std::time::Duration;

use crate::config::DispatchConfig;

/// Per-credential retry budget and delay schedule.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Attempts per credential, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt (doubles each attempt).
    pub base_delay: Duration,
    /// Maximum delay between attempts.
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &DispatchConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: config.backoff_base,
            max_delay: config.backoff_max,
        }
    }

    /// Delay to wait after `attempt` (1-based) failed, before the next one.
    ///
    /// `min(base * 2^(attempt-1), max)`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(31);
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(exp));
        delay.min(self.max_delay)
    }

    /// Whether another attempt is allowed after `attempt` failed.
    pub fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}
