//! Cache store contract.
//!
//! The proxy is a client of an external key-value store. Only `get` and
//! `set` with a TTL are required.

use std::time::Duration;
use async_trait::async_trait;
use axum::body::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache store unavailable: {0}")]
    Unavailable(String),
}

/// Minimal key-value store used by the response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value. `Ok(None)` is a miss.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Short name for logs and metrics.
    fn name(&self) -> &'static str;
}
