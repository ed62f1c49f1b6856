//! Client configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheBackend;
use crate::error::WarehouseError;

/// Configuration surface consumed by the client core.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    /// Default result TTL in milliseconds; 0 disables caching by default.
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,
    /// Whether cache keys are digested (SHA-256) rather than literal SQL text.
    #[serde(default = "default_digest_keys")]
    pub digest_keys: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Backend selector: "none", "inmemory" or "redis".
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Connection URL, required for the redis backend.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Prefix for all backend keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_ttl_ms() -> u64 {
    2000
}

fn default_digest_keys() -> bool {
    true
}

fn default_backend() -> String {
    "none".to_string()
}

fn default_key_prefix() -> String {
    "warebridge:".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            default_ttl_ms: default_ttl_ms(),
            digest_keys: default_digest_keys(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis_url: None,
            key_prefix: default_key_prefix(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a file plus environment variables.
    ///
    /// Environment variables use the `WAREBRIDGE_` prefix, e.g.
    /// `WAREBRIDGE_CACHE_BACKEND=redis`.
    pub fn load(config_path: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name(config_path))
            .add_source(
                config::Environment::with_prefix("WAREBRIDGE")
                    .separator("_")
                    .try_parsing(true),
            );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration. Unknown backends and a redis selection without
    /// a URL are rejected here, before any connection is attempted.
    pub fn validate(&self) -> Result<(), WarehouseError> {
        let backend = CacheBackend::from_str(&self.cache.backend)?;
        if backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(WarehouseError::InvalidCacheBackend(
                "redis backend requires redis_url".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }
}
