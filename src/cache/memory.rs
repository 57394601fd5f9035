//! In-process cache store.
//!
//! A TTL-aware concurrent map for single-instance deployments and tests.
//! Expired entries are dropped on read, and every `sweep_every` writes the
//! whole map is purged of expired entries.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use async_trait::async_trait;
use axum::body::Bytes;
use dashmap::DashMap;
use crate::cache::store::{CacheError, CacheStore};

const DEFAULT_SWEEP_EVERY: u64 = 256;

#[derive(Debug)]
pub struct MemoryStore {
    entries: DashMap<String, (Bytes, Instant)>,
    writes: AtomicU64,
    sweep_every: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_EVERY)
    }

    /// Purge expired entries once every `writes` calls to `set`.
    pub fn with_sweep_interval(writes: u64) -> Self {
        Self {
            entries: DashMap::new(),
            writes: AtomicU64::new(0),
            sweep_every: writes.max(1),
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(value.clone()));
            }
        }
        self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));

        let writes = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if writes % self.sweep_every == 0 {
            let removed = self.purge_expired();
            if removed > 0 {
                tracing::debug!(removed, remaining = self.entries.len(), "Purged expired cache entries");
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
