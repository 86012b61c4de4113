//! Key cache: JWKS fetched from a remote endpoint and cached with a TTL.
//!
//! Refresh is pull-based. A lookup against an empty or stale set refreshes
//! first; a lookup that misses in a fresh set refreshes exactly once and
//! then reports `UnknownKey`. There is no background refresher.
//!
//! # Concurrency
//!
//! The cached set is an `Arc<KeySet>` behind a `RwLock` and is replaced
//! wholesale, so readers never see a partially updated set. Refreshes are
//! coalesced: a caller that queued behind an in-flight refresh reuses that
//! refresh's result instead of fetching again. A refresh whose caller is
//! dropped mid-fetch leaves the cached set untouched.

use crate::error::ApiError;
use crate::observability::metrics::record_jwks_refresh;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::instrument;

/// Default cache TTL in seconds (5 minutes).
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;

/// Timeout for a single key-set fetch.
pub const JWKS_FETCH_TIMEOUT: Duration = Duration::from_secs(4);

/// JSON Web Key as published by the key-set endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key type ("OKP" for Ed25519).
    pub kty: String,

    /// Key ID. Keys without one cannot be selected and are skipped.
    #[serde(default)]
    pub kid: Option<String>,

    /// Curve name ("Ed25519").
    #[serde(default)]
    pub crv: Option<String>,

    /// Public key value (base64url encoded).
    #[serde(default)]
    pub x: Option<String>,

    /// Algorithm ("EdDSA").
    #[serde(default)]
    pub alg: Option<String>,

    /// Key use ("sig").
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
}

/// JWKS document.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksResponse {
    #[serde(default)]
    pub keys: Vec<Jwk>,
}

/// One fetched key set. Never mutated after construction.
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, Jwk>,
    fetched_at: Instant,
    ttl: Duration,
}

impl KeySet {
    /// Build a key set from a JWKS document, dropping keys without a `kid`.
    pub fn from_response(response: JwksResponse, fetched_at: Instant, ttl: Duration) -> Self {
        let keys = response
            .keys
            .into_iter()
            .filter_map(|key| {
                let kid = key.kid.clone().filter(|k| !k.is_empty())?;
                Some((kid, key))
            })
            .collect();

        Self {
            keys,
            fetched_at,
            ttl,
        }
    }

    /// Whether the set is still within its TTL at `now`.
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.fetched_at) <= self.ttl
    }

    pub fn get(&self, kid: &str) -> Option<&Jwk> {
        self.keys.get(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Cache of verification keys, constructed once at startup and shared by
/// handle with the verifier.
pub struct KeyCache {
    /// URL to the JWKS endpoint.
    jwks_url: String,

    /// HTTP client for fetching JWKS.
    http_client: reqwest::Client,

    /// Current key set, replaced wholesale on refresh.
    current: RwLock<Option<Arc<KeySet>>>,

    /// Serializes refreshes so overlapping callers share one fetch.
    refresh_lock: Mutex<()>,

    /// How long a fetched set stays fresh.
    cache_ttl: Duration,
}

impl KeyCache {
    /// Create a key cache with the default TTL.
    pub fn new(jwks_url: String) -> Self {
        Self::with_ttl(jwks_url, Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS))
    }

    /// Create a key cache with a custom TTL.
    pub fn with_ttl(jwks_url: String, cache_ttl: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(JWKS_FETCH_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "common.auth.jwks", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            jwks_url,
            http_client,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            cache_ttl,
        }
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Get a key by key ID.
    ///
    /// Refreshes at most once per call: when the cache is empty or stale, or
    /// when the key is missing from a fresh set.
    ///
    /// # Errors
    ///
    /// - `ApiError::UpstreamUnavailable` if a needed refresh fails
    /// - `ApiError::UnknownKey` if the key is absent after the refresh
    #[instrument(skip(self), fields(kid = %kid))]
    pub async fn get_key(&self, kid: &str) -> Result<Jwk, ApiError> {
        let snapshot = self.snapshot().await;

        match &snapshot {
            Some(set) if set.is_fresh_at(Instant::now()) => {
                if let Some(key) = set.get(kid) {
                    tracing::debug!(target: "common.auth.jwks", "JWKS cache hit");
                    return Ok(key.clone());
                }
                tracing::debug!(target: "common.auth.jwks", "Key not in fresh JWKS, refreshing once");
            }
            Some(_) => {
                tracing::debug!(target: "common.auth.jwks", "JWKS cache stale, refreshing");
            }
            None => {
                tracing::debug!(target: "common.auth.jwks", "JWKS cache empty, refreshing");
            }
        }

        let refreshed = self.refresh_after(snapshot.as_ref()).await?;

        if let Some(key) = refreshed.get(kid) {
            return Ok(key.clone());
        }

        tracing::warn!(target: "common.auth.jwks", "Key not found in JWKS after refresh");
        Err(ApiError::UnknownKey)
    }

    /// Force a refresh regardless of freshness.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::UpstreamUnavailable` if the fetch fails.
    pub async fn refresh(&self) -> Result<(), ApiError> {
        let _guard = self.refresh_lock.lock().await;
        let set = self.fetch().await?;
        *self.current.write().await = Some(set);
        Ok(())
    }

    /// Number of keys in the cached set, if any set is loaded.
    pub async fn cached_key_count(&self) -> Option<usize> {
        self.snapshot().await.map(|set| set.len())
    }

    async fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.current.read().await.clone()
    }

    /// Refresh unless another caller already replaced `observed` with a
    /// fresh set while this one waited for the refresh lock.
    async fn refresh_after(&self, observed: Option<&Arc<KeySet>>) -> Result<Arc<KeySet>, ApiError> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.snapshot().await {
            let replaced = observed.map_or(true, |seen| !Arc::ptr_eq(seen, &current));
            if replaced && current.is_fresh_at(Instant::now()) {
                tracing::debug!(target: "common.auth.jwks", "Reusing JWKS refreshed by a concurrent caller");
                return Ok(current);
            }
        }

        let set = self.fetch().await?;
        *self.current.write().await = Some(Arc::clone(&set));
        Ok(set)
    }

    /// Fetch and parse the key set. Does not touch the cache.
    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Arc<KeySet>, ApiError> {
        tracing::debug!(target: "common.auth.jwks", url = %self.jwks_url, "Fetching JWKS");
        let start = Instant::now();

        let result = self.fetch_inner().await;
        record_jwks_refresh(
            if result.is_ok() { "success" } else { "error" },
            start.elapsed(),
        );

        let set = result?;
        tracing::info!(
            target: "common.auth.jwks",
            key_count = set.len(),
            "JWKS cache refreshed"
        );
        Ok(Arc::new(set))
    }

    async fn fetch_inner(&self) -> Result<KeySet, ApiError> {
        let response = self
            .http_client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(
                    target: "common.auth.jwks",
                    error = %e,
                    timeout = e.is_timeout(),
                    "Failed to fetch JWKS"
                );
                ApiError::UpstreamUnavailable("Key set endpoint unreachable".to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "common.auth.jwks",
                status = %response.status(),
                "JWKS endpoint returned error"
            );
            return Err(ApiError::UpstreamUnavailable(format!(
                "Key set endpoint returned {}",
                response.status()
            )));
        }

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "common.auth.jwks", error = %e, "Failed to parse JWKS response");
            ApiError::UpstreamUnavailable("Key set response unreadable".to_string())
        })?;

        Ok(KeySet::from_response(jwks, Instant::now(), self.cache_ttl))
    }
}
