//! Dispatcher metrics collection.
//!
//! Provides standardized metrics for monitoring the credential pool:
//! - Attempt counters by outcome and failure class
//! - Attempt latency histogram
//! - Cooldown, eviction and throttle counters

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::error::{DispatchError, DispatchResult};

/// Install the Prometheus recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> DispatchResult<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| DispatchError::config_error(format!("Failed to install Prometheus recorder: {}", e)))
}

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Upstream attempts by outcome and failure class.
    pub const ATTEMPTS_TOTAL: &str = "clipgen_attempts_total";

    /// Upstream attempt latency in seconds.
    pub const ATTEMPT_LATENCY_SECONDS: &str = "clipgen_attempt_latency_seconds";

    /// Credentials placed in cooldown.
    pub const COOLDOWNS_TOTAL: &str = "clipgen_cooldowns_total";

    /// Credentials evicted from the registry.
    pub const EVICTIONS_TOTAL: &str = "clipgen_evictions_total";

    /// Calls rejected by the per-user throttle.
    pub const THROTTLE_REJECTIONS_TOTAL: &str = "clipgen_throttle_rejections_total";

    /// Calls that ended with every credential exhausted.
    pub const POOL_EXHAUSTED_TOTAL: &str = "clipgen_pool_exhausted_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a finished upstream attempt.
///
/// `class` is `"success"` for served attempts, otherwise the failure class.
pub fn record_attempt(class: &'static str, success: bool, latency_ms: u64) {
    counter!(
        names::ATTEMPTS_TOTAL,
        "outcome" => if success { "success" } else { "failure" },
        "class" => class
    )
    .increment(1);

    histogram!(names::ATTEMPT_LATENCY_SECONDS).record(latency_ms as f64 / 1000.0);
}

pub fn record_cooldown() {
    counter!(names::COOLDOWNS_TOTAL).increment(1);
}

pub fn record_eviction() {
    counter!(names::EVICTIONS_TOTAL).increment(1);
}

pub fn record_throttle_rejection() {
    counter!(names::THROTTLE_REJECTIONS_TOTAL).increment(1);
}

pub fn record_pool_exhausted() {
    counter!(names::POOL_EXHAUSTED_TOTAL).increment(1);
}
