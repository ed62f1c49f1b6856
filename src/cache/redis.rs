//! Redis cache store.
//!
//! Backed by a single shared `ConnectionManager`, which multiplexes and
//! reconnects internally. Entries are written with `SET .. EX`, so expiry is
//! enforced server-side and may outlive the writing process.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::CacheStore;

pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("conn", &"<ConnectionManager>")
            .finish()
    }
}

impl RedisCacheStore {
    /// Connect to the given Redis URL. Fails fast when the server is
    /// unreachable, so misconfiguration surfaces at construction time.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> = self.conn().get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        // EX takes whole seconds; round sub-second TTLs up to one.
        let seconds = ttl.as_secs().max(1);
        let _: () = self.conn().set_ex(key, value, seconds).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<String> {
        let pong: String = redis::cmd("PING").query_async(&mut self.conn()).await?;
        Ok(pong)
    }

    async fn disconnect(&self) -> Result<()> {
        // ConnectionManager closes its multiplexed connection on drop; there
        // is no explicit close to issue.
        tracing::debug!("redis cache store released");
        Ok(())
    }
}
