//! Admission and identity configuration.
//!
//! Loaded from environment variables. Every service embeds an
//! [`AdmissionConfig`] and hands it to the key cache, verifier and limiter
//! it constructs at startup.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default key-set cache TTL in seconds (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default sustained rate in requests per second per key.
pub const DEFAULT_RATE_LIMIT_RPS: f64 = 30.0;

/// Default bucket capacity.
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 60;

/// Default header carrying a caller identity hint for rate-limit keying.
pub const DEFAULT_RATE_LIMIT_KEY_HEADER: &str = "x-user-id";

/// Default idle age after which a bucket is evicted.
pub const DEFAULT_RATE_LIMIT_IDLE_EVICT_SECONDS: u64 = 600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid boolean for {0}: {1}")]
    InvalidBool(String, String),

    #[error("Invalid JWKS configuration: {0}")]
    InvalidJwks(String),

    #[error("Invalid rate limit configuration: {0}")]
    InvalidRateLimit(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Request-admission configuration.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Skip credential verification and use a fixed local identity.
    pub disable_auth: bool,

    /// Key-set (JWKS) endpoint. Required unless `disable_auth` is set.
    pub jwks_url: Option<String>,

    /// Expected `iss`. `None` disables the check.
    pub issuer: Option<String>,

    /// Expected `aud`. `None` disables the check.
    pub audience: Option<String>,

    /// How long a fetched key set stays fresh.
    pub jwks_cache_ttl: Duration,

    /// Whether the rate limiter runs at all.
    pub rate_limit_enabled: bool,

    /// Refill rate in tokens per second.
    pub rate_limit_rps: f64,

    /// Bucket capacity.
    pub rate_limit_burst: u32,

    /// Header that, when present, keys the limiter by caller identity.
    pub rate_limit_key_header: String,

    /// Buckets untouched for this long are evicted.
    pub rate_limit_idle_evict: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            disable_auth: false,
            jwks_url: None,
            issuer: None,
            audience: None,
            jwks_cache_ttl: Duration::from_secs(DEFAULT_JWKS_CACHE_TTL_SECONDS),
            rate_limit_enabled: true,
            rate_limit_rps: DEFAULT_RATE_LIMIT_RPS,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_key_header: DEFAULT_RATE_LIMIT_KEY_HEADER.to_string(),
            rate_limit_idle_evict: Duration::from_secs(DEFAULT_RATE_LIMIT_IDLE_EVICT_SECONDS),
        }
    }
}

impl AdmissionConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but invalid, or if
    /// `JWKS_URL` is missing while verification is enabled.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// See [`AdmissionConfig::from_env`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let disable_auth = parse_bool(vars, "DISABLE_AUTH", defaults.disable_auth)?;

        let jwks_url = non_empty(vars, "JWKS_URL");
        if !disable_auth && jwks_url.is_none() {
            return Err(ConfigError::MissingEnvVar("JWKS_URL".to_string()));
        }

        let issuer = non_empty(vars, "JWT_ISSUER");
        let audience = non_empty(vars, "JWT_AUDIENCE");

        let jwks_cache_ttl = if let Some(value_str) = vars.get("JWKS_CACHE_TTL_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwks(format!(
                    "JWKS_CACHE_TTL_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;
            if value == 0 {
                return Err(ConfigError::InvalidJwks(
                    "JWKS_CACHE_TTL_SECONDS must be greater than 0".to_string(),
                ));
            }
            Duration::from_secs(value)
        } else {
            defaults.jwks_cache_ttl
        };

        let rate_limit_enabled =
            parse_bool(vars, "RATE_LIMIT_ENABLED", defaults.rate_limit_enabled)?;

        let rate_limit_rps = if let Some(value_str) = vars.get("RATE_LIMIT_RPS") {
            let value: f64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRateLimit(format!(
                    "RATE_LIMIT_RPS must be a number, got '{value_str}': {e}"
                ))
            })?;
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidRateLimit(format!(
                    "RATE_LIMIT_RPS must be greater than 0, got {value}"
                )));
            }
            value
        } else {
            defaults.rate_limit_rps
        };

        let rate_limit_burst = if let Some(value_str) = vars.get("RATE_LIMIT_BURST") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRateLimit(format!(
                    "RATE_LIMIT_BURST must be a valid positive integer, got '{value_str}': {e}"
                ))
            })?;
            if value == 0 {
                return Err(ConfigError::InvalidRateLimit(
                    "RATE_LIMIT_BURST must be at least 1".to_string(),
                ));
            }
            value
        } else {
            defaults.rate_limit_burst
        };

        let rate_limit_key_header = non_empty(vars, "RATE_LIMIT_KEY_HEADER")
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or(defaults.rate_limit_key_header);

        let rate_limit_idle_evict =
            if let Some(value_str) = vars.get("RATE_LIMIT_IDLE_EVICT_SECONDS") {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidRateLimit(format!(
                    "RATE_LIMIT_IDLE_EVICT_SECONDS must be a valid positive integer, got '{value_str}': {e}"
                ))
                })?;
                if value == 0 {
                    return Err(ConfigError::InvalidRateLimit(
                        "RATE_LIMIT_IDLE_EVICT_SECONDS must be greater than 0".to_string(),
                    ));
                }
                Duration::from_secs(value)
            } else {
                defaults.rate_limit_idle_evict
            };

        Ok(Self {
            disable_auth,
            jwks_url,
            issuer,
            audience,
            jwks_cache_ttl,
            rate_limit_enabled,
            rate_limit_rps,
            rate_limit_burst,
            rate_limit_key_header,
            rate_limit_idle_evict,
        })
    }
}

/// Read a variable, treating an empty or whitespace-only value as absent.
fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Parse a boolean flag. Accepts `true/false`, `1/0`, `yes/no`, `on/off`.
///
/// # Errors
///
/// Returns `ConfigError::InvalidBool` for any other value.
pub fn parse_bool(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match vars.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "" => Ok(default),
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidBool(key.to_string(), v)),
        },
    }
}
