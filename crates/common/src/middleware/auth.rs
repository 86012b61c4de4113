//! Authentication middleware for protected routes.
//!
//! Extracts the Bearer token from the Authorization header, verifies it
//! with the [`TokenVerifier`], and injects the resulting [`IdentityClaims`]
//! into request extensions.

use crate::auth::{IdentityClaims, TokenVerifier};
use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub verifier: Arc<TokenVerifier>,
}

/// Pull the token out of `Authorization: Bearer <token>`.
///
/// The scheme is matched case-insensitively.
///
/// # Errors
///
/// Returns `ApiError::Unauthenticated` when the header is missing, not
/// valid ASCII, uses another scheme, or carries an empty token.
pub fn extract_bearer(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            tracing::debug!(target: "common.middleware.auth", "Missing Authorization header");
            ApiError::Unauthenticated("Missing Authorization header".to_string())
        })?;

    let (scheme, token) = value.trim().split_once(' ').ok_or_else(|| {
        tracing::debug!(target: "common.middleware.auth", "Invalid Authorization header format");
        ApiError::Unauthenticated("Invalid Authorization header format".to_string())
    })?;

    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        tracing::debug!(target: "common.middleware.auth", "Authorization header is not a bearer token");
        return Err(ApiError::Unauthenticated(
            "Invalid Authorization header format".to_string(),
        ));
    }

    Ok(token)
}

/// Verify the bearer credential and store the identity for handlers.
///
/// # Response
///
/// - 401 with `WWW-Authenticate` if the token is missing or rejected
/// - 503 if the key set cannot be fetched
/// - otherwise continues with [`IdentityClaims`] in extensions
///
/// In bypass mode a missing or malformed header is not an error; the
/// verifier returns the fixed local identity for any input.
#[instrument(skip_all, name = "common.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = match extract_bearer(req.headers()) {
        Ok(token) => token.to_string(),
        Err(_) if state.verifier.is_bypass() => String::new(),
        Err(e) => return Err(e),
    };

    let claims: IdentityClaims = state.verifier.verify(&token).await?;

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
