//! Metrics definitions for the gateway.
//!
//! All gateway metrics use the `gw_` prefix, `_total` for counters and
//! `_seconds` for duration histograms. Admission metrics (`admission_`)
//! are recorded by `common` and exported by the same recorder.
//!
//! # Cardinality
//!
//! - `method`: 7 values max
//! - `endpoint`: parameterized paths, unknown paths collapse to `/other`
//! - `service`: 2 values (conversation, transaction)
//! - `outcome`: 4 values (success, client_error, server_error, timeout)

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Configure histogram buckets on a Prometheus builder.
///
/// # Errors
///
/// Returns an error string if a bucket set is rejected.
pub fn configure_buckets(builder: PrometheusBuilder) -> Result<PrometheusBuilder, String> {
    builder
        .set_buckets_for_metric(
            Matcher::Prefix("gw_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        // Downstream calls are bounded by the 10s downstream timeout
        .set_buckets_for_metric(
            Matcher::Prefix("gw_downstream_request".to_string()),
            &[
                0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.000,
            ],
        )
        .map_err(|e| format!("Failed to set downstream request buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Prefix("admission_".to_string()),
            &[0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500, 1.000, 4.000],
        )
        .map_err(|e| format!("Failed to set admission buckets: {e}"))
}

/// Install the global Prometheus recorder and return its handle.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns an error if the recorder cannot be installed (e.g. already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    configure_buckets(PrometheusBuilder::new())?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Record HTTP request completion.
///
/// Metric: `gw_http_requests_total`, `gw_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status_code` (counter) / `status` (histogram)
pub fn record_http_request(method: &str, path: &str, status_code: u16, duration: Duration) {
    let endpoint = normalize_endpoint(path);
    let status = categorize_status_code(status_code);

    histogram!("gw_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => endpoint.clone(),
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("gw_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

/// Record one downstream call.
///
/// Metric: `gw_downstream_requests_total`, `gw_downstream_request_duration_seconds`
/// Labels: `service`, `outcome`
pub fn record_downstream_request(service: &'static str, outcome: &'static str, duration: Duration) {
    histogram!("gw_downstream_request_duration_seconds",
        "service" => service,
        "outcome" => outcome
    )
    .record(duration.as_secs_f64());

    counter!("gw_downstream_requests_total",
        "service" => service,
        "outcome" => outcome
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        429 => "rate_limited",
        _ => "error",
    }
}

/// Replace path parameters so the label stays bounded.
fn normalize_endpoint(path: &str) -> String {
    match path {
        "/healthz" | "/metrics" | "/v1/chat/message" | "/v1/chat/feedback" => path.to_string(),
        _ => normalize_dashboard_endpoint(path),
    }
}

/// `/v1/dashboard/users/{user_id}/{view}` for known views, else `/other`.
fn normalize_dashboard_endpoint(path: &str) -> String {
    let Some(rest) = path.strip_prefix("/v1/dashboard/users/") else {
        return "/other".to_string();
    };

    let mut parts = rest.split('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(user), Some(view), None)
            if !user.is_empty()
                && matches!(
                    view,
                    "transactions" | "summary" | "insights" | "recommendations" | "overview"
                ) =>
        {
            format!("/v1/dashboard/users/{{user_id}}/{view}")
        }
        _ => "/other".to_string(),
    }
}
