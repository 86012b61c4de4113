//! Rate limiter bucket eviction task.
//!
//! Buckets are created on first use per key and would otherwise live
//! forever. This task periodically drops buckets that have been idle long
//! enough to have refilled completely, which keeps memory bounded by the
//! set of recently active keys.
//!
//! # Graceful Shutdown
//!
//! The task exits when its cancellation token is triggered.

use common::rate_limit::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// Default eviction interval in seconds.
pub const DEFAULT_EVICTION_INTERVAL_SECONDS: u64 = 60;

/// Start the bucket eviction background task.
///
/// # Arguments
///
/// * `limiter` - The limiter whose buckets are swept
/// * `max_idle` - Idle age after which a bucket may be dropped
/// * `interval` - Time between sweeps
/// * `cancel_token` - Token for graceful shutdown
#[instrument(skip_all, name = "gw.task.bucket_eviction")]
pub async fn start_bucket_eviction(
    limiter: Arc<RateLimiter>,
    max_idle: Duration,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    info!(
        target: "gw.task.bucket_eviction",
        max_idle_secs = max_idle.as_secs(),
        interval_secs = interval.as_secs(),
        "Starting bucket eviction task"
    );

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; there is nothing to sweep yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let removed = limiter.evict_idle(max_idle);
                if removed > 0 {
                    debug!(
                        target: "gw.task.bucket_eviction",
                        removed,
                        remaining = limiter.len(),
                        "Evicted idle rate limit buckets"
                    );
                }
            }
            () = cancel_token.cancelled() => {
                info!(
                    target: "gw.task.bucket_eviction",
                    "Bucket eviction task received shutdown signal, exiting"
                );
                break;
            }
        }
    }

    info!(target: "gw.task.bucket_eviction", "Bucket eviction task stopped");
}
