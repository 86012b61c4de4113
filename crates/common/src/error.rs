//! Error taxonomy for the admission/identity layer and the gateway.
//!
//! All errors map to HTTP status codes via the `IntoResponse` impl. Every
//! client-facing body carries a machine-readable `code` and a human-readable
//! `message`. Internal detail (transport errors, downstream server bodies) is
//! logged server-side and never returned to the client.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Generic message for every credential rejection that reaches the client.
pub const INVALID_CREDENTIAL_MESSAGE: &str = "The access token is invalid or expired";

/// Error type shared by every service.
///
/// Maps to HTTP status codes:
/// - `RateLimited`: 429 Too Many Requests (with `Retry-After`)
/// - `Unauthenticated` and every credential rejection: 401 Unauthorized
/// - `Unauthorized`: 403 Forbidden
/// - `RequestTimeout`: 504 Gateway Timeout
/// - `UpstreamUnavailable`: 503 Service Unavailable
/// - `DownstreamClientError`: the downstream 4xx status, verbatim
/// - `DownstreamServerError`: 502 Bad Gateway (masked)
/// - `Internal`: 500 Internal Server Error
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Rate limit exceeded")]
    RateLimited { retry_after: Duration },

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Valid credential, disallowed operation. Reserved for scope checks.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Malformed credential")]
    MalformedCredential,

    #[error("Unknown signing key")]
    UnknownKey,

    #[error("Invalid signature")]
    SignatureInvalid,

    #[error("Credential expired")]
    Expired,

    #[error("Audience mismatch")]
    AudienceMismatch,

    #[error("Issuer mismatch")]
    IssuerMismatch,

    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Downstream client error ({status}): {message}")]
    DownstreamClientError { status: StatusCode, message: String },

    #[error("Downstream server error: {0}")]
    DownstreamServerError(String),

    #[error("Request timed out")]
    RequestTimeout,

    #[error("Internal server error")]
    Internal,
}

impl ApiError {
    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unauthenticated(_)
            | ApiError::MalformedCredential
            | ApiError::UnknownKey
            | ApiError::SignatureInvalid
            | ApiError::Expired
            | ApiError::AudienceMismatch
            | ApiError::IssuerMismatch => StatusCode::UNAUTHORIZED,
            ApiError::Unauthorized(_) => StatusCode::FORBIDDEN,
            ApiError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DownstreamClientError { status, .. } => *status,
            ApiError::DownstreamServerError(_) => StatusCode::BAD_GATEWAY,
            ApiError::RequestTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error kind returned to clients.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::RateLimited { .. } => "RATE_LIMITED",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::MalformedCredential => "MALFORMED_CREDENTIAL",
            ApiError::UnknownKey => "UNKNOWN_KEY",
            ApiError::SignatureInvalid => "INVALID_SIGNATURE",
            ApiError::Expired => "TOKEN_EXPIRED",
            ApiError::AudienceMismatch => "AUDIENCE_MISMATCH",
            ApiError::IssuerMismatch => "ISSUER_MISMATCH",
            ApiError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            ApiError::DownstreamClientError { .. } => "DOWNSTREAM_CLIENT_ERROR",
            ApiError::DownstreamServerError(_) => "DOWNSTREAM_FAILURE",
            ApiError::RequestTimeout => "REQUEST_TIMEOUT",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }
}

/// Seconds to advertise in `Retry-After`, rounded up and never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs_f64().ceil();
    if secs < 1.0 {
        1
    } else {
        // Float-to-int casts saturate, so Duration::MAX advertises u64::MAX
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let secs = secs as u64;
        secs
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        let message = match &self {
            ApiError::RateLimited { .. } => {
                "Too many requests. Please try again later.".to_string()
            }
            ApiError::Unauthenticated(reason) | ApiError::Unauthorized(reason) => reason.clone(),
            ApiError::MalformedCredential
            | ApiError::UnknownKey
            | ApiError::SignatureInvalid
            | ApiError::Expired
            | ApiError::AudienceMismatch
            | ApiError::IssuerMismatch => INVALID_CREDENTIAL_MESSAGE.to_string(),
            ApiError::UpstreamUnavailable(reason) => {
                tracing::warn!(target: "common.error", reason = %reason, "Upstream unavailable");
                "Service temporarily unavailable".to_string()
            }
            ApiError::DownstreamClientError { message, .. } => message.clone(),
            ApiError::DownstreamServerError(detail) => {
                tracing::error!(target: "common.error", detail = %detail, "Downstream failure masked");
                "An upstream service failed to complete the request".to_string()
            }
            ApiError::RequestTimeout => "The request took too long to complete".to_string(),
            ApiError::Internal => "An internal error occurred".to_string(),
        };

        let retry_after = match &self {
            ApiError::RateLimited { retry_after } => Some(retry_after_secs(*retry_after)),
            _ => None,
        };

        let error_response = ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
            },
        };

        let mut response = (status, Json(error_response)).into_response();

        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(
                    "Bearer realm=\"banking-assistant\", error=\"invalid_token\"",
                ),
            );
        }

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }

        response
    }
}
