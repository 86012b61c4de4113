//! Maps whole-request timeouts into the shared error envelope.

use axum::BoxError;
use common::error::ApiError;
use tower::timeout::error::Elapsed;

/// Error handler for the `tower` timeout layer on the router.
///
/// Expiry becomes a 504 `REQUEST_TIMEOUT`; any other layer error is an
/// internal error.
pub async fn handle_request_timeout(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        tracing::warn!(target: "gw.middleware.timeout", "Request exceeded the gateway timeout");
        ApiError::RequestTimeout
    } else {
        tracing::error!(target: "gw.middleware.timeout", error = %err, "Unhandled middleware error");
        ApiError::Internal
    }
}
