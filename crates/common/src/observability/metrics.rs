//! Admission-layer metrics.
//!
//! All metrics use the `admission_` prefix, `_total` for counters and
//! `_seconds` for duration histograms. Recording is a no-op until the
//! service installs a recorder.
//!
//! # Cardinality
//!
//! - `decision`: 2 values (admitted, rejected)
//! - `outcome`: bounded by error codes plus `success` and `bypass`
//! - `status`: 2 values (success, error)

use metrics::{counter, histogram};
use std::time::Duration;

/// Metric-name prefix shared by every admission metric, for bucket config.
pub const METRIC_PREFIX: &str = "admission_";

/// Record a rate-limiter decision.
///
/// Metric: `admission_rate_limit_decisions_total`
/// Labels: `decision`
pub fn record_rate_limit_decision(admitted: bool) {
    let decision = if admitted { "admitted" } else { "rejected" };
    counter!("admission_rate_limit_decisions_total", "decision" => decision).increment(1);
}

/// Record a credential verification.
///
/// Metric: `admission_token_validations_total`, `admission_token_validation_duration_seconds`
/// Labels: `outcome`
pub fn record_token_validation(outcome: &'static str, duration: Duration) {
    histogram!("admission_token_validation_duration_seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
    counter!("admission_token_validations_total", "outcome" => outcome).increment(1);
}

/// Record a key-set fetch.
///
/// Metric: `admission_jwks_refresh_total`, `admission_jwks_refresh_duration_seconds`
/// Labels: `status`
pub fn record_jwks_refresh(status: &'static str, duration: Duration) {
    histogram!("admission_jwks_refresh_duration_seconds", "status" => status)
        .record(duration.as_secs_f64());
    counter!("admission_jwks_refresh_total", "status" => status).increment(1);
}

/// Record the number of live rate-limit buckets after an eviction sweep.
///
/// Metric: `admission_rate_limit_buckets`
pub fn set_rate_limit_bucket_count(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!("admission_rate_limit_buckets").set(count as f64);
}
