//! HTTP routes for the gateway.
//!
//! Defines the Axum router and application state.

use crate::config::Config;
use crate::handlers;
use crate::middleware::{handle_request_timeout, http_metrics_middleware};
use crate::services::GatewayAggregator;
use axum::{
    error_handling::HandleErrorLayer,
    middleware,
    routing::{get, post},
    Router,
};
use common::auth::TokenVerifier;
use common::middleware::{enforce_rate_limit, require_auth, AuthState, RateLimitState};
use common::rate_limit::RateLimiter;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Whole-request timeout applied to every route.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Service configuration.
    pub config: Config,

    /// Downstream fan-out.
    pub aggregator: GatewayAggregator,

    /// Credential verifier shared with the auth middleware.
    pub verifier: Arc<TokenVerifier>,

    /// Admission limiter shared with the rate limit middleware and the
    /// eviction task.
    pub rate_limiter: Arc<RateLimiter>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/healthz` - Liveness probe - public
/// - `/metrics` - Prometheus metrics - public
/// - `/v1/chat/*` - Chat relay - authenticated
/// - `/v1/dashboard/users/:user_id/*` - Dashboard views - authenticated
///
/// Every request is rate limited before authentication runs, so a rejected
/// request never costs a key-set lookup. `/healthz` and `/metrics` are
/// exempt.
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let auth_state = Arc::new(AuthState {
        verifier: Arc::clone(&state.verifier),
    });
    let rate_limit_state = Arc::new(RateLimitState {
        limiter: Arc::clone(&state.rate_limiter),
        key_header: state.config.admission.rate_limit_key_header.clone(),
    });

    let public_routes = Router::new().route("/healthz", get(handlers::health_check));

    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    let protected_routes = Router::new()
        .route("/v1/chat/message", post(handlers::chat_message))
        .route("/v1/chat/feedback", post(handlers::chat_feedback))
        .route(
            "/v1/dashboard/users/:user_id/transactions",
            get(handlers::dashboard_transactions),
        )
        .route(
            "/v1/dashboard/users/:user_id/summary",
            get(handlers::dashboard_summary),
        )
        .route(
            "/v1/dashboard/users/:user_id/insights",
            get(handlers::dashboard_insights),
        )
        .route(
            "/v1/dashboard/users/:user_id/recommendations",
            get(handlers::dashboard_recommendations),
        )
        .route(
            "/v1/dashboard/users/:user_id/overview",
            get(handlers::dashboard_overview),
        )
        .route_layer(middleware::from_fn_with_state(auth_state, require_auth))
        .with_state(state);

    // Layer order (outermost last):
    // 1. enforce_rate_limit - admission, ahead of auth
    // 2. TraceLayer - log request details
    // 3. timeout - bound the whole request, answered as a 504 envelope
    // 4. http_metrics_middleware - record ALL responses, including 429s
    public_routes
        .merge(metrics_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            rate_limit_state,
            enforce_rate_limit,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_request_timeout))
                .timeout(REQUEST_TIMEOUT),
        )
        .layer(middleware::from_fn(http_metrics_middleware))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::services::DownstreamClient;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use common::rate_limit::RateLimitConfig;
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use tower::ServiceExt;

    fn test_app(burst: u32) -> Router {
        let vars = HashMap::from([("DISABLE_AUTH".to_string(), "true".to_string())]);
        let config = Config::from_vars(&vars).unwrap();
        let client = DownstreamClient::new(
            // Nothing listens here; these tests never reach a downstream.
            "http://127.0.0.1:9".to_string(),
            "http://127.0.0.1:9".to_string(),
            Duration::from_millis(200),
        )
        .unwrap();

        let state = Arc::new(AppState {
            config,
            aggregator: GatewayAggregator::new(client),
            verifier: Arc::new(TokenVerifier::bypass()),
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::new(0.001, burst).unwrap())),
        });
        let handle = PrometheusBuilder::new().build_recorder().handle();
        build_routes(state, handle)
    }

    fn request(uri: &str) -> Request<Body> {
        let mut req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 1], 40000))));
        req
    }

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }

    #[tokio::test]
    async fn test_healthz_is_public_and_exempt() {
        let app = test_app(1);
        for _ in 0..5 {
            let response = app.clone().oneshot(request("/healthz")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.oneshot(request("/healthz")).await.unwrap();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["service"], "api_gateway_local");
    }

    #[tokio::test]
    async fn test_rate_limit_applies_to_protected_routes() {
        let app = test_app(1);

        // The first request is admitted and fails downstream; the second is
        // rejected before it gets that far.
        let first = app
            .clone()
            .oneshot(request("/v1/dashboard/users/u1/summary"))
            .await
            .unwrap();
        assert_ne!(first.status(), StatusCode::TOO_MANY_REQUESTS);

        let second = app
            .oneshot(request("/v1/dashboard/users/u1/summary"))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(second.headers().contains_key(header::RETRY_AFTER));
    }

    #[tokio::test]
    async fn test_metrics_route_is_served() {
        let app = test_app(1);
        let response = app.oneshot(request("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
