//! Banking Assistant API Gateway
//!
//! Entry point for the client-facing gateway.

use common::auth::TokenVerifier;
use common::observability::init_tracing;
use common::rate_limit::RateLimiter;
use gateway_service::config::Config;
use gateway_service::observability::metrics::init_metrics_recorder;
use gateway_service::routes::{self, AppState};
use gateway_service::services::{DownstreamClient, GatewayAggregator};
use gateway_service::tasks::{start_bucket_eviction, DEFAULT_EVICTION_INTERVAL_SECONDS};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const DEFAULT_LOG_FILTER: &str = "gateway_service=info,common=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let json_logs = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    init_tracing(DEFAULT_LOG_FILTER, json_logs);

    info!("Starting API gateway");

    // Install the Prometheus recorder before anything records a metric
    let metrics_handle = init_metrics_recorder().map_err(|e| {
        error!("Failed to initialize metrics recorder: {}", e);
        e
    })?;

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        conversation_service_url = %config.conversation_service_url,
        transaction_service_url = %config.transaction_service_url,
        downstream_timeout_secs = config.downstream_timeout.as_secs(),
        auth_disabled = config.admission.disable_auth,
        rate_limit_enabled = config.admission.rate_limit_enabled,
        "Configuration loaded successfully"
    );

    let verifier = Arc::new(TokenVerifier::from_config(&config.admission).map_err(|e| {
        error!("Failed to configure token verifier: {}", e);
        e
    })?);

    let rate_limiter = Arc::new(RateLimiter::from_config(&config.admission).map_err(|e| {
        error!("Failed to configure rate limiter: {}", e);
        e
    })?);

    let client = DownstreamClient::new(
        config.conversation_service_url.clone(),
        config.transaction_service_url.clone(),
        config.downstream_timeout,
    )?;

    let cancel_token = CancellationToken::new();
    let eviction_handle = tokio::spawn(start_bucket_eviction(
        Arc::clone(&rate_limiter),
        config.admission.rate_limit_idle_evict,
        Duration::from_secs(DEFAULT_EVICTION_INTERVAL_SECONDS),
        cancel_token.clone(),
    ));

    let bind_address = config.bind_address.clone();
    let drain_period = config.drain_period;

    let state = Arc::new(AppState {
        config,
        aggregator: GatewayAggregator::new(client),
        verifier,
        rate_limiter,
    });

    let app = routes::build_routes(state, metrics_handle);

    let addr: SocketAddr = bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("API gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(drain_period))
    .await?;

    cancel_token.cancel();
    if let Err(e) = eviction_handle.await {
        warn!("Bucket eviction task did not shut down cleanly: {}", e);
    }

    info!("API gateway shutdown complete");

    Ok(())
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
/// Returns when a shutdown signal is received and the drain period is complete.
async fn shutdown_signal(drain_period: Duration) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    if drain_period.is_zero() {
        info!("Skipping drain period (GW_DRAIN_SECONDS=0)");
    } else {
        warn!("Draining connections for {} seconds...", drain_period.as_secs());
        tokio::time::sleep(drain_period).await;
        info!("Drain period complete");
    }
}
