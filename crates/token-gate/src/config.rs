//! Token gate configuration.
//!
//! Configuration is loaded once at startup from environment variables and
//! handed to the gate explicitly. Missing or invalid values fail fast.

use crate::auth::claims::AudienceClaim;
use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default per-request timeout for the key-set fetch, in milliseconds.
pub const DEFAULT_JWKS_FETCH_TIMEOUT_MS: u64 = 3_000;

/// Upper bound for the key-set fetch timeout, in milliseconds.
pub const MAX_JWKS_FETCH_TIMEOUT_MS: u64 = 30_000;

/// Default deadline for one whole verification, in milliseconds.
pub const DEFAULT_VERIFY_DEADLINE_MS: u64 = 5_000;

/// Upper bound for the verification deadline, in milliseconds.
pub const MAX_VERIFY_DEADLINE_MS: u64 = 60_000;

/// Default key-set cache TTL in seconds.
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default minimum spacing between forced key-set refreshes, in seconds.
pub const DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS: u64 = 10;

/// Token gate configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Issuer region (e.g., "us-east-1").
    pub region: String,

    /// User pool identifier within the region.
    pub user_pool_id: String,

    /// Expected audience (app client id).
    pub expected_audience: String,

    /// Which claim carries the audience.
    pub audience_claim: AudienceClaim,

    /// Key-set endpoint. Derived from region and pool unless overridden.
    pub jwks_url: String,

    /// Per-request network timeout for the key-set fetch.
    pub jwks_fetch_timeout: Duration,

    /// Deadline for the whole verification pipeline.
    pub verify_deadline: Duration,

    /// Key-set cache staleness bound. Zero disables caching.
    pub jwks_cache_ttl: Duration,

    /// Minimum spacing between forced refreshes after an unknown kid.
    pub jwks_min_refresh_interval: Duration,

    /// HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Invalid audience claim configuration: {0}")]
    InvalidAudienceClaim(String),

    #[error("Invalid timeout configuration: {0}")]
    InvalidTimeout(String),

    #[error("Invalid cache configuration: {0}")]
    InvalidCache(String),
}

/// Builds the well-known key-set URL for a user pool.
pub fn default_jwks_url(region: &str, user_pool_id: &str) -> String {
    format!(
        "https://cognito-idp.{}.amazonaws.com/{}/.well-known/jwks.json",
        region, user_pool_id
    )
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let region = required(vars, "AWS_REGION")?;
        validate_identifier("AWS_REGION", &region)?;

        let user_pool_id = required(vars, "USERPOOL_ID")?;
        validate_identifier("USERPOOL_ID", &user_pool_id)?;

        let expected_audience = required(vars, "APP_CLIENT_ID")?;

        let audience_claim = match optional(vars, "AUDIENCE_CLAIM") {
            Some(value) => AudienceClaim::from_name(&value).ok_or_else(|| {
                ConfigError::InvalidAudienceClaim(format!(
                    "AUDIENCE_CLAIM must be 'aud' or 'client_id', got '{}'",
                    value
                ))
            })?,
            None => AudienceClaim::Aud,
        };

        let jwks_url = optional(vars, "JWKS_URL")
            .unwrap_or_else(|| default_jwks_url(&region, &user_pool_id));

        let fetch_timeout_ms = parse_u64(
            vars,
            "JWKS_FETCH_TIMEOUT_MS",
            DEFAULT_JWKS_FETCH_TIMEOUT_MS,
            ConfigError::InvalidTimeout,
        )?;
        if fetch_timeout_ms == 0 || fetch_timeout_ms > MAX_JWKS_FETCH_TIMEOUT_MS {
            return Err(ConfigError::InvalidTimeout(format!(
                "JWKS_FETCH_TIMEOUT_MS must be between 1 and {}, got {}",
                MAX_JWKS_FETCH_TIMEOUT_MS, fetch_timeout_ms
            )));
        }

        let deadline_ms = parse_u64(
            vars,
            "VERIFY_DEADLINE_MS",
            DEFAULT_VERIFY_DEADLINE_MS,
            ConfigError::InvalidTimeout,
        )?;
        if deadline_ms < fetch_timeout_ms || deadline_ms > MAX_VERIFY_DEADLINE_MS {
            return Err(ConfigError::InvalidTimeout(format!(
                "VERIFY_DEADLINE_MS must be between JWKS_FETCH_TIMEOUT_MS ({}) and {}, got {}",
                fetch_timeout_ms, MAX_VERIFY_DEADLINE_MS, deadline_ms
            )));
        }

        let cache_ttl_seconds = parse_u64(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
            ConfigError::InvalidCache,
        )?;

        let min_refresh_interval_seconds = parse_u64(
            vars,
            "JWKS_MIN_REFRESH_INTERVAL_SECONDS",
            DEFAULT_JWKS_MIN_REFRESH_INTERVAL_SECONDS,
            ConfigError::InvalidCache,
        )?;

        let bind_address =
            optional(vars, "BIND_ADDRESS").unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        Ok(Config {
            region,
            user_pool_id,
            expected_audience,
            audience_claim,
            jwks_url,
            jwks_fetch_timeout: Duration::from_millis(fetch_timeout_ms),
            verify_deadline: Duration::from_millis(deadline_ms),
            jwks_cache_ttl: Duration::from_secs(cache_ttl_seconds),
            jwks_min_refresh_interval: Duration::from_secs(min_refresh_interval_seconds),
            bind_address,
        })
    }
}

/// Empty values count as unset.
fn optional(vars: &HashMap<String, String>, name: &str) -> Option<String> {
    vars.get(name)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn required(vars: &HashMap<String, String>, name: &str) -> Result<String, ConfigError> {
    optional(vars, name).ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_u64(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    err: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    match optional(vars, name) {
        Some(value_str) => value_str.parse().map_err(|e| {
            err(format!(
                "{} must be a valid non-negative integer, got '{}': {}",
                name, value_str, e
            ))
        }),
        None => Ok(default),
    }
}

// Identifiers are interpolated into the endpoint URL path.
fn validate_identifier(name: &str, value: &str) -> Result<(), ConfigError> {
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(format!(
            "{} may only contain letters, digits, '-' and '_', got '{}'",
            name, value
        )))
    }
}
