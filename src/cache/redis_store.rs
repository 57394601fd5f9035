//! Redis-backed cache store.

use std::time::Duration;
use async_trait::async_trait;
use axum::body::Bytes;
use redis::{aio::ConnectionManager, AsyncCommands};
use crate::cache::store::{CacheError, CacheStore};

/// Cache store backed by a Redis server.
///
/// `ConnectionManager` multiplexes one connection and reconnects on failure,
/// so it is cloned per call instead of pooled.
pub struct RedisStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisStore {
    /// Connect and verify the server answers PING.
    pub async fn connect(url: &str, key_prefix: impl Into<String>) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        tracing::info!(url = %url, "Connected to redis");

        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn.get(self.full_key(key)).await?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SETEX rejects zero; sub-second TTLs round up.
        let secs = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(self.full_key(key), value.as_ref(), secs).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
