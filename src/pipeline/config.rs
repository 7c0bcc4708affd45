//! Pipeline configuration.
//!
//! This module provides configuration options for the decryption pipeline:
//! remote service location, registration identity, pool size, HTTP timeout,
//! the reset policy for orphaned results and the reference cipher key.

use std::time::Duration;
use thiserror::Error;

use crate::api::DEFAULT_REQUEST_TIMEOUT;
use crate::decrypt::reference::DEFAULT_CIPHER_KEY;
use crate::decrypt::MAX_CLIENT_COUNT;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// What a reset does with results that completed on the abandoned
/// generation's channel but were never read by the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    /// Forward them to validation like any other result.
    #[default]
    Validate,
    /// Discard them with the channel.
    Drop,
}

/// Configuration for the decryption pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Base URL of the password service.
    pub api_url: String,
    /// Name sent on registration.
    pub identity: String,
    /// Number of concurrently running workers per generation.
    pub pool_size: usize,
    /// Timeout applied to every remote call.
    pub request_timeout: Duration,
    /// Reset behaviour for results left on an abandoned generation.
    pub orphan_policy: OrphanPolicy,
    /// Key byte for the reference decrypter.
    pub cipher_key: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:9000".to_string(),
            identity: "decrypt-pool".to_string(),
            pool_size: MAX_CLIENT_COUNT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            orphan_policy: OrphanPolicy::Validate,
            cipher_key: DEFAULT_CIPHER_KEY,
        }
    }
}

impl PipelineConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DECRYPT_API_URL`: Password service base URL (default: http://localhost:9000)
    /// - `DECRYPT_IDENTITY`: Registration name (default: decrypt-pool)
    /// - `DECRYPT_POOL_SIZE`: Workers per generation (default: 7)
    /// - `DECRYPT_TIMEOUT_SECS`: Remote call timeout in seconds (default: 30)
    /// - `DECRYPT_DROP_ORPHANS`: Drop orphaned results on reset (default: false)
    /// - `DECRYPT_CIPHER_KEY`: Reference decrypter key byte (default: 90)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value or the
    /// resulting configuration does not validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("DECRYPT_API_URL") {
            config.api_url = val;
        }

        if let Ok(val) = std::env::var("DECRYPT_IDENTITY") {
            config.identity = val;
        }

        if let Ok(val) = std::env::var("DECRYPT_POOL_SIZE") {
            config.pool_size = parse_env_value(&val, "DECRYPT_POOL_SIZE")?;
        }

        if let Ok(val) = std::env::var("DECRYPT_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "DECRYPT_TIMEOUT_SECS")?;
            config.request_timeout = Duration::from_secs(secs);
        }

        if let Ok(val) = std::env::var("DECRYPT_DROP_ORPHANS") {
            if parse_env_bool(&val, "DECRYPT_DROP_ORPHANS")? {
                config.orphan_policy = OrphanPolicy::Drop;
            }
        }

        if let Ok(val) = std::env::var("DECRYPT_CIPHER_KEY") {
            config.cipher_key = parse_env_value(&val, "DECRYPT_CIPHER_KEY")?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_url.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "api_url cannot be empty".to_string(),
            ));
        }

        if self.identity.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "identity cannot be empty".to_string(),
            ));
        }

        if self.pool_size == 0 || self.pool_size > MAX_CLIENT_COUNT {
            return Err(ConfigError::ValidationFailed(format!(
                "pool_size must be between 1 and {}",
                MAX_CLIENT_COUNT
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "request_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the service URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Builder method to set the registration identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Builder method to set the pool size.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Builder method to set the remote call timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder method to set the orphan policy.
    pub fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }

    /// Builder method to set the reference cipher key.
    pub fn with_cipher_key(mut self, key: u8) -> Self {
        self.cipher_key = key;
        self
    }
}

/// Parse an environment variable value.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}

/// Parse an environment variable as a boolean.
fn parse_env_bool(value: &str, key: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean value, got '{}'", value),
        }),
    }
}
