//! Test server harness for E2E testing
//!
//! Provides `TestGatewayServer` for spawning real gateway instances in tests.

use common::auth::TokenVerifier;
use common::rate_limit::RateLimiter;
use gateway_service::config::Config;
use gateway_service::routes::{self, AppState};
use gateway_service::services::{DownstreamClient, GatewayAggregator};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Test harness for spawning the API gateway in E2E tests.
///
/// # Example
/// ```rust,ignore
/// #[tokio::test]
/// async fn test_health_flow_e2e() -> Result<()> {
///     let vars = HashMap::from([("DISABLE_AUTH".to_string(), "true".to_string())]);
///     let server = TestGatewayServer::spawn(vars).await?;
///
///     let response = reqwest::get(format!("{}/healthz", server.url())).await?;
///     assert_eq!(response.status(), 200);
///     Ok(())
/// }
/// ```
pub struct TestGatewayServer {
    addr: SocketAddr,
    config: Config,
    rate_limiter: Arc<RateLimiter>,
    _handle: JoinHandle<()>,
}

impl TestGatewayServer {
    /// Spawn a new test server instance.
    ///
    /// `vars` are gateway environment variables; `BIND_ADDRESS` is always
    /// replaced with `127.0.0.1:0`.
    ///
    /// The server will:
    /// - Bind to a random available port
    /// - Start the HTTP server in the background with peer addresses
    ///   available to the rate limiter
    pub async fn spawn(vars: HashMap<String, String>) -> Result<Self, anyhow::Error> {
        let mut vars = vars;
        vars.insert("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string());

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let verifier = Arc::new(
            TokenVerifier::from_config(&config.admission)
                .map_err(|e| anyhow::anyhow!("Failed to create verifier: {}", e))?,
        );
        let rate_limiter = Arc::new(
            RateLimiter::from_config(&config.admission)
                .map_err(|e| anyhow::anyhow!("Failed to create rate limiter: {}", e))?,
        );
        let client = DownstreamClient::new(
            config.conversation_service_url.clone(),
            config.transaction_service_url.clone(),
            config.downstream_timeout,
        )
        .map_err(|e| anyhow::anyhow!("Failed to create downstream client: {}", e))?;

        let state = Arc::new(AppState {
            config: config.clone(),
            aggregator: GatewayAggregator::new(client),
            verifier,
            rate_limiter: Arc::clone(&rate_limiter),
        });

        // A detached recorder: tests must not install a global one
        let metrics_handle = PrometheusBuilder::new().build_recorder().handle();

        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
            if let Err(e) = axum::serve(listener, make_service).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            config,
            rate_limiter,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get the socket address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get reference to the server configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The server's rate limiter, for inspecting bucket state.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}

impl Drop for TestGatewayServer {
    fn drop(&mut self) {
        // Abort the server task so the port is released when the test ends
        self._handle.abort();
    }
}
