//! Configuration loader for the `codemetal-sensorwatch` service.
//!
//! This module centralizes all runtime configuration values and their defaults,
//! loading from environment variables (with optional `.env` file support
//! provided by the caller). By consolidating configuration logic here, we
//! avoid scattering `env::var` calls throughout the codebase.
//!
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use uuid::Uuid;

use crate::pipeline::RetryPolicy;

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse a required string environment variable.
macro_rules! require_env {
    ($var_name:expr) => {
        env::var($var_name)
            .map_err(|_| anyhow!("{} must be set in .env or environment", $var_name))?
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent configuration
/// snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// PostgreSQL connection string.
    pub db_url: String,

    /// Maximum number of database connections in the pool.
    pub db_pool_max: u32,

    /// Tenant carried on every reading and alert written by this instance.
    pub tenant_id: Uuid,

    /// JSON file with the measurement-type and threshold catalogs.
    pub catalog_path: PathBuf,

    /// HTTP listen port.
    pub http_port: u16,

    /// Retries after a transient storage failure (bounded).
    pub store_max_retries: u32,

    /// Delay before the first retry, doubled per further retry.
    pub store_retry_backoff_ms: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Required:
/// - `DATABASE_URL` – PostgreSQL connection string
/// - `TENANT_ID` – tenant UUID
///
/// Optional:
/// - `DB_POOL_MAX` – max DB connections (default: 5)
/// - `CATALOG_PATH` – catalog JSON file (default: `catalog.json`)
/// - `HTTP_PORT` – listen port (default: 8080)
/// - `STORE_MAX_RETRIES` – retries on transient storage failure (default: 3)
/// - `STORE_RETRY_BACKOFF_MS` – base retry delay (default: 100)
///
/// Returns an error if any required variable is missing or invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let db_url = require_env!("DATABASE_URL");
    let tenant_id = require_env!("TENANT_ID");
    let tenant_id =
        Uuid::parse_str(&tenant_id).map_err(|e| anyhow!("Invalid TENANT_ID: {}", e))?;
    let catalog_path =
        PathBuf::from(env::var("CATALOG_PATH").unwrap_or_else(|_| "catalog.json".into()));
    let db_pool_max = parse_env_u32!("DB_POOL_MAX", 5);
    let http_port = parse_env_u32!("HTTP_PORT", 8080);
    let http_port =
        u16::try_from(http_port).map_err(|_| anyhow!("Invalid HTTP_PORT: {}", http_port))?;
    let store_max_retries = parse_env_u32!("STORE_MAX_RETRIES", 3);
    let store_retry_backoff_ms = parse_env_u32!("STORE_RETRY_BACKOFF_MS", 100);

    Ok(Config {
        db_url,
        db_pool_max,
        tenant_id,
        catalog_path,
        http_port,
        store_max_retries,
        store_retry_backoff_ms,
    })
}

impl Config {
    /// Retry policy for the pipeline's storage calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.store_max_retries,
            backoff: Duration::from_millis(u64::from(self.store_retry_backoff_ms)),
        }
    }

    /// Log the loaded configuration for debugging purposes.
    ///
    /// Masks sensitive information like database passwords while showing
    /// all configuration values that were loaded.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!("  DATABASE_URL           : {}", self.masked_db_url());
        tracing::info!("  DB_POOL_MAX            : {}", self.db_pool_max);
        tracing::info!("  TENANT_ID              : {}", self.tenant_id);
        tracing::info!("  CATALOG_PATH           : {}", self.catalog_path.display());
        tracing::info!("  HTTP_PORT              : {}", self.http_port);
        tracing::info!("  STORE_MAX_RETRIES      : {}", self.store_max_retries);
        tracing::info!("  STORE_RETRY_BACKOFF_MS : {}", self.store_retry_backoff_ms);
    }

    /// Database URL with the password replaced by `****`.
    pub fn masked_db_url(&self) -> String {
        // ---
        if let Some(at_pos) = self.db_url.rfind('@') {
            if let Some(colon_pos) = self.db_url[..at_pos].rfind(':') {
                return format!(
                    "{}:****{}",
                    &self.db_url[..colon_pos],
                    &self.db_url[at_pos..]
                );
            }
        }
        self.db_url.clone()
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn config(db_url: &str) -> Config {
        Config {
            db_url: db_url.into(),
            db_pool_max: 5,
            tenant_id: Uuid::nil(),
            catalog_path: "catalog.json".into(),
            http_port: 8080,
            store_max_retries: 4,
            store_retry_backoff_ms: 250,
        }
    }

    #[test]
    fn test_password_is_masked() {
        // ---
        let cfg = config("postgres://sensor:s3cret@db:5432/sensorwatch");
        assert_eq!(cfg.masked_db_url(), "postgres://sensor:****@db:5432/sensorwatch");

        let cfg = config("postgres://db:5432/sensorwatch");
        assert_eq!(cfg.masked_db_url(), "postgres://db:5432/sensorwatch");
    }

    #[test]
    fn test_retry_policy_from_config() {
        // ---
        let policy = config("postgres://db/x").retry_policy();
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.backoff, Duration::from_millis(250));
    }
}
