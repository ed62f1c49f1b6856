//! Pluggable result-cache backends.
//!
//! The coordinator treats every backend operation as fail-soft: a failed
//! `get` is a miss, a failed `set` is logged and dropped. Selecting an
//! unrecognized backend fails fast at construction, never at call time.

use std::fmt::Debug;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;
use crate::connector::Row;
use crate::error::WarehouseError;

pub mod key;
pub mod memory;
pub mod redis;

pub use key::CacheKey;
pub use memory::InMemoryCacheStore;
pub use redis::RedisCacheStore;

/// Uniform interface over the interchangeable stores.
#[async_trait]
pub trait CacheStore: Debug + Send + Sync {
    /// Fetch the serialized value under `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key` with the given expiry.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Liveness probe.
    async fn ping(&self) -> Result<String>;

    /// Scoped release of the backend connection, invoked at shutdown.
    async fn disconnect(&self) -> Result<()>;
}

/// Serialized envelope stored under a cache key.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CachedRows {
    pub data: Vec<Row>,
    pub cached_at: u64,
}

impl CachedRows {
    pub fn new(data: Vec<Row>) -> Self {
        let cached_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self { data, cached_at }
    }
}

/// The backend variants a client can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    None,
    InMemory,
    Redis,
}

impl FromStr for CacheBackend {
    type Err = WarehouseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(CacheBackend::None),
            "inmemory" => Ok(CacheBackend::InMemory),
            "redis" => Ok(CacheBackend::Redis),
            other => Err(WarehouseError::InvalidCacheBackend(other.to_string())),
        }
    }
}

/// Open the store selected by `config`. `Ok(None)` means caching through a
/// backend is disabled and the coordinator serves in-process rows only.
pub async fn open_store(config: &CacheConfig) -> Result<Option<Arc<dyn CacheStore>>, WarehouseError> {
    match CacheBackend::from_str(&config.backend)? {
        CacheBackend::None => Ok(None),
        CacheBackend::InMemory => Ok(Some(Arc::new(InMemoryCacheStore::new()))),
        CacheBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                WarehouseError::InvalidCacheBackend(
                    "redis backend requires redis_url".to_string(),
                )
            })?;
            let store = RedisCacheStore::connect(url)
                .await
                .map_err(|e| WarehouseError::CacheBackend(e.to_string()))?;
            Ok(Some(Arc::new(store)))
        }
    }
}
