//! Request-admission and identity layer shared by every banking-assistant
//! service.
//!
//! Every inbound request flows through the same pipeline:
//!
//! ```text
//! rate_limit (admit/reject) -> auth (verify bearer credential) -> handler
//! ```
//!
//! The pieces are explicitly constructed components, built once at process
//! start and handed to the router:
//!
//! - [`auth::KeyCache`] - JWKS fetched from a remote endpoint, cached with a TTL
//! - [`auth::TokenVerifier`] - EdDSA JWT verification against the key cache
//! - [`rate_limit::RateLimiter`] - per-key token buckets
//! - [`middleware`] - axum middleware composing the above
//! - [`error::ApiError`] - the error taxonomy and its HTTP mapping

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Admission and identity configuration loaded from the environment
pub mod config;

/// Error taxonomy with HTTP status mapping
pub mod error;

/// JWT parsing helpers (size limits, header inspection, temporal checks)
pub mod jwt;

/// Key cache, token verifier and identity claims
pub mod auth;

/// Per-key token bucket rate limiter
pub mod rate_limit;

/// Request pipeline middleware (rate limit, then authentication)
pub mod middleware;

/// Logging initialisation and admission metrics
pub mod observability;

/// Deterministic key fixtures and token builders for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod testing;
