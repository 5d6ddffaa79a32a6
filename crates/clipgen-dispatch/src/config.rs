//! Dispatcher configuration.

use std::time::Duration;

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Maximum admitted requests per user within `user_window`
    pub user_max_requests: usize,
    /// Width of the per-user sliding window
    pub user_window: Duration,
    /// How long a credential stays disabled after a quota signal
    pub cooldown_duration: Duration,
    /// Attempts per credential within one call (including the first)
    pub max_attempts: u32,
    /// Delay after the first failed attempt; doubles each attempt
    pub backoff_base: Duration,
    /// Upper bound for any single backoff delay
    pub backoff_max: Duration,
    /// Bound on every upstream call
    pub upstream_timeout: Duration,
    /// Label written to the usage ledger for `generate` calls
    pub request_label: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            user_max_requests: 10,
            user_window: Duration::from_secs(60),
            cooldown_duration: Duration::from_secs(30 * 60),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            backoff_max: Duration::from_millis(5000),
            upstream_timeout: Duration::from_secs(60),
            request_label: "clip_suggestions".to_string(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl DispatchConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            user_max_requests: env_parse("CLIPGEN_USER_MAX_REQUESTS")
                .unwrap_or(defaults.user_max_requests),
            user_window: env_parse("CLIPGEN_USER_WINDOW_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.user_window),
            cooldown_duration: env_parse("CLIPGEN_COOLDOWN_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.cooldown_duration),
            max_attempts: env_parse("CLIPGEN_MAX_ATTEMPTS")
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            backoff_base: env_parse("CLIPGEN_BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_base),
            backoff_max: env_parse("CLIPGEN_BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff_max),
            upstream_timeout: env_parse("CLIPGEN_UPSTREAM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.upstream_timeout),
            request_label: std::env::var("CLIPGEN_REQUEST_LABEL")
                .unwrap_or(defaults.request_label),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_user_limit(mut self, max_requests: usize, window: Duration) -> Self {
        self.user_max_requests = max_requests;
        self.user_window = window;
        self
    }

    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }
}
