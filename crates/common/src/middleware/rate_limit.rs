//! Rate limiting middleware.
//!
//! Runs before authentication. Exempt paths pass straight through; every
//! other request is charged against the bucket for its identity hint header
//! or, failing that, its peer address.

use crate::error::ApiError;
use crate::rate_limit::{is_exempt_path, rate_limit_key, Admission, RateLimiter};
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::instrument;

/// State for the rate limiting middleware.
#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: Arc<RateLimiter>,

    /// Lowercase name of the header carrying the caller identity hint.
    pub key_header: String,
}

/// Reject requests whose bucket is empty with 429 and `Retry-After`.
#[instrument(skip_all, name = "common.middleware.rate_limit")]
pub async fn enforce_rate_limit(
    State(state): State<Arc<RateLimitState>>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.limiter.is_enabled() || is_exempt_path(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let hint = req
        .headers()
        .get(state.key_header.as_str())
        .and_then(|h| h.to_str().ok());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let key = rate_limit_key(hint, peer);

    match state.limiter.admit(&key) {
        Admission::Admitted => Ok(next.run(req).await),
        Admission::Rejected { retry_after } => Err(ApiError::RateLimited { retry_after }),
    }
}
