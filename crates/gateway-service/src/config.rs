//! Gateway configuration.
//!
//! Loaded from environment variables; `from_vars` takes an explicit map so
//! tests never touch the process environment. Nothing here is secret, so
//! the derived `Debug` is safe to log.

use common::config::{AdmissionConfig, ConfigError};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

/// Default bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8000";

/// Default base URL of the conversation service.
pub const DEFAULT_CONVERSATION_SERVICE_URL: &str = "http://127.0.0.1:8001";

/// Default base URL of the transaction service.
pub const DEFAULT_TRANSACTION_SERVICE_URL: &str = "http://127.0.0.1:8002";

/// Default timeout for a single downstream call.
pub const DEFAULT_DOWNSTREAM_TIMEOUT_SECONDS: u64 = 10;

/// Default shutdown drain period (none).
pub const DEFAULT_DRAIN_SECONDS: u64 = 0;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP server binds to.
    pub bind_address: String,

    pub conversation_service_url: String,

    pub transaction_service_url: String,

    /// Timeout applied to every downstream call; a timeout is reported the
    /// same way as an unreachable service.
    pub downstream_timeout: Duration,

    /// How long to keep serving in-flight requests after a shutdown signal.
    pub drain_period: Duration,

    /// Rate limiting and credential verification settings.
    pub admission: AdmissionConfig,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if any variable is present but invalid, or if
    /// the admission settings are incomplete.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    ///
    /// # Errors
    ///
    /// See [`Config::from_env`].
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let admission = AdmissionConfig::from_vars(vars)?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let conversation_service_url = base_url(
            vars,
            "CONVERSATION_SERVICE_URL",
            DEFAULT_CONVERSATION_SERVICE_URL,
        )?;
        let transaction_service_url = base_url(
            vars,
            "TRANSACTION_SERVICE_URL",
            DEFAULT_TRANSACTION_SERVICE_URL,
        )?;

        let downstream_timeout = Duration::from_secs(positive_secs(
            vars,
            "DOWNSTREAM_TIMEOUT_SECONDS",
            DEFAULT_DOWNSTREAM_TIMEOUT_SECONDS,
        )?);

        let drain_period = match vars.get("GW_DRAIN_SECONDS") {
            Some(value_str) => {
                let value: u64 = value_str.parse().map_err(|e| {
                    ConfigError::InvalidValue(
                        "GW_DRAIN_SECONDS".to_string(),
                        format!("must be a non-negative integer, got '{value_str}': {e}"),
                    )
                })?;
                Duration::from_secs(value)
            }
            None => Duration::from_secs(DEFAULT_DRAIN_SECONDS),
        };

        Ok(Self {
            bind_address,
            conversation_service_url,
            transaction_service_url,
            downstream_timeout,
            drain_period,
            admission,
        })
    }
}

/// An `http(s)://` base URL with any trailing slash removed.
fn base_url(
    vars: &HashMap<String, String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    let value = vars
        .get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .unwrap_or(default);

    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("must be an http(s) URL, got '{value}'"),
        ));
    }

    Ok(value.trim_end_matches('/').to_string())
}

fn positive_secs(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };
    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidValue(
            key.to_string(),
            format!("must be a valid positive integer, got '{value_str}': {e}"),
        )
    })?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than 0".to_string(),
        ));
    }
    Ok(value)
}
