//! Per-key token bucket rate limiter.
//!
//! Each key owns a bucket of capacity `burst` that refills continuously at
//! `rps` tokens per second. A check refills, then consumes one token or
//! rejects with the time until one token is available.
//!
//! Buckets live in a [`DashMap`]; a check holds the shard lock for its key
//! for the whole refill-and-consume step, so concurrent checks for the same
//! key can never both spend the last token. Checks for keys on other shards
//! do not contend.

use crate::config::{AdmissionConfig, ConfigError};
use crate::observability::metrics::{record_rate_limit_decision, set_rate_limit_bucket_count};
use dashmap::DashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Paths that are never rate limited.
pub const EXEMPT_PATHS: &[&str] = &["/healthz", "/docs", "/openapi.json", "/metrics"];

/// Whether `path` bypasses the limiter.
pub fn is_exempt_path(path: &str) -> bool {
    EXEMPT_PATHS.contains(&path)
}

/// Bucket key for a request.
///
/// A non-empty identity hint wins; otherwise the peer address; otherwise a
/// shared `ip:unknown` bucket.
pub fn rate_limit_key(identity_hint: Option<&str>, peer: Option<IpAddr>) -> String {
    match (identity_hint.map(str::trim).filter(|h| !h.is_empty()), peer) {
        (Some(hint), _) => format!("user:{hint}"),
        (None, Some(ip)) => format!("ip:{ip}"),
        (None, None) => "ip:unknown".to_string(),
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Token bucket parameters.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    rps: f64,
    burst: u32,
}

impl RateLimitConfig {
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRateLimit` unless `rps` is finite and
    /// positive and `burst` is at least 1.
    pub fn new(rps: f64, burst: u32) -> Result<Self, ConfigError> {
        if !rps.is_finite() || rps <= 0.0 {
            return Err(ConfigError::InvalidRateLimit(format!(
                "rps must be greater than 0, got {rps}"
            )));
        }
        if burst == 0 {
            return Err(ConfigError::InvalidRateLimit(
                "burst must be at least 1".to_string(),
            ));
        }
        Ok(Self { rps, burst })
    }

    pub fn rps(&self) -> f64 {
        self.rps
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }

    fn capacity(&self) -> f64 {
        f64::from(self.burst)
    }

    /// Time for an empty bucket to refill completely.
    fn time_to_full(&self) -> Duration {
        secs_to_duration(self.capacity() / self.rps)
    }
}

/// Saturates at `Duration::MAX` for refill times too long to represent.
fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn full(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity(),
            last_refill: now,
        }
    }

    fn try_acquire(&mut self, config: &RateLimitConfig, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill);
        let refill = elapsed.as_secs_f64() * config.rps;
        self.tokens = (self.tokens + refill).min(config.capacity());
        if now > self.last_refill {
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(secs_to_duration(deficit / config.rps))
        }
    }
}

/// Per-key admission filter.
pub struct RateLimiter {
    config: RateLimitConfig,
    enabled: bool,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            enabled: true,
            buckets: DashMap::new(),
        }
    }

    /// A limiter that admits everything.
    pub fn disabled(config: RateLimitConfig) -> Self {
        Self {
            config,
            enabled: false,
            buckets: DashMap::new(),
        }
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidRateLimit` if the configured rate or
    /// burst is out of range.
    pub fn from_config(config: &AdmissionConfig) -> Result<Self, ConfigError> {
        let bucket = RateLimitConfig::new(config.rate_limit_rps, config.rate_limit_burst)?;
        if config.rate_limit_enabled {
            Ok(Self::new(bucket))
        } else {
            tracing::info!(target: "common.rate_limit", "Rate limiting disabled by configuration");
            Ok(Self::disabled(bucket))
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn admit(&self, key: &str) -> Admission {
        self.admit_at(key, Instant::now())
    }

    /// Admission check against an explicit clock.
    pub fn admit_at(&self, key: &str, now: Instant) -> Admission {
        if !self.enabled {
            return Admission::Admitted;
        }

        let result = {
            let mut bucket = self
                .buckets
                .entry(key.to_string())
                .or_insert_with(|| Bucket::full(&self.config, now));
            bucket.try_acquire(&self.config, now)
        };

        record_rate_limit_decision(result.is_ok());
        match result {
            Ok(()) => Admission::Admitted,
            Err(retry_after) => {
                tracing::debug!(
                    target: "common.rate_limit",
                    retry_after_ms = retry_after.as_millis(),
                    "Request rejected by rate limiter"
                );
                Admission::Rejected { retry_after }
            }
        }
    }

    /// Drop buckets idle for at least `max_idle`. Returns how many were removed.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        self.evict_idle_at(max_idle, Instant::now())
    }

    /// Eviction against an explicit clock.
    ///
    /// A bucket is only dropped once it would have refilled to capacity, so
    /// recreating it later as a full bucket admits nothing extra.
    pub fn evict_idle_at(&self, max_idle: Duration, now: Instant) -> usize {
        let threshold = max_idle.max(self.config.time_to_full());
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < threshold);
        let after = self.buckets.len();
        set_rate_limit_bucket_count(after);
        before.saturating_sub(after)
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}
