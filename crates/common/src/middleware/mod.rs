//! Request pipeline middleware.
//!
//! Layer the rate limiter outside authentication so a flood of requests is
//! rejected before any credential work happens:
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/v1/...", post(handler))
//!     .route_layer(from_fn_with_state(auth_state, require_auth))
//!     .layer(from_fn_with_state(rate_limit_state, enforce_rate_limit))
//! ```

pub mod auth;
pub mod rate_limit;

pub use auth::{extract_bearer, require_auth, AuthState};
pub use rate_limit::{enforce_rate_limit, RateLimitState};
