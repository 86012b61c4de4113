//! Liveness probe.
//!
//! `/healthz` only reports that the process is serving; it checks no
//! dependencies and is exempt from rate limiting and authentication.

use crate::models::HealthResponse;
use axum::Json;

/// Service name reported by the liveness probe.
pub const SERVICE_NAME: &str = "api_gateway_local";

/// Handler for GET /healthz
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}
