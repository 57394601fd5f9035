//! Cache coordination.
//!
//! # Responsibilities
//! - Look up cached responses (store failures read as misses)
//! - Collapse concurrent misses for one key into a single backend call
//! - Derive the TTL and write the response exactly once per call
//!
//! # Coalescing
//! ```text
//! miss(key) ──┬─ first caller: register watch channel, spawn fetch task
//!             └─ later callers: clone the receiver, wait
//! fetch task: store recheck → backend call → store set → unregister → publish
//! ```
//! The fetch runs on its own task, so a disconnecting leader never strands
//! its followers.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use axum::body::Bytes;
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use tokio::sync::watch;

use crate::cache::policy::{response_ttl, should_store};
use crate::cache::store::CacheStore;
use crate::http::forward::ForwardError;
use crate::http::response::UpstreamResponse;
use crate::observability::metrics;

/// Result shared with every waiter of one in-flight call.
pub type SharedOutcome = Result<Arc<UpstreamResponse>, ForwardError>;

type InflightMap = DashMap<String, watch::Receiver<Option<SharedOutcome>>>;

/// Counters exposed through the admin API.
#[derive(Debug, Default)]
struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
    stores: AtomicU64,
    store_errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub store: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub stores: u64,
    pub store_errors: u64,
    pub in_flight: usize,
}

pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    inflight: Arc<InflightMap>,
    counters: Arc<CacheCounters>,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, default_ttl: Duration) -> Self {
        Self {
            store,
            default_ttl,
            inflight: Arc::new(DashMap::new()),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    /// Look up `key`. Store errors and undecodable entries count as misses.
    pub async fn lookup(&self, key: &str) -> Option<UpstreamResponse> {
        let cached = match self.store.get(key).await {
            Ok(Some(bytes)) => UpstreamResponse::decode(&bytes),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(cache_key = %key, store = self.store.name(), error = %e, "Cache lookup failed");
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("store_error");
                None
            }
        };

        match cached {
            Some(response) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("hit");
                tracing::debug!(cache_key = %key, "Cache hit");
                Some(response)
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("miss");
                None
            }
        }
    }

    /// Run `fetch` for `key` unless a call for the same key is already in
    /// flight, in which case wait for that call's outcome instead.
    pub async fn fetch_coalesced<F>(&self, key: &str, fetch: F) -> SharedOutcome
    where
        F: Future<Output = Result<UpstreamResponse, ForwardError>> + Send + 'static,
    {
        let (mut rx, leader_tx) = match self.inflight.entry(key.to_string()) {
            Entry::Occupied(e) => (e.get().clone(), None),
            Entry::Vacant(e) => {
                let (tx, rx) = watch::channel(None);
                e.insert(rx.clone());
                (rx, Some(tx))
            }
        };

        match leader_tx {
            Some(tx) => {
                let call = InflightCall {
                    key: key.to_string(),
                    registered: rx.clone(),
                    store: self.store.clone(),
                    default_ttl: self.default_ttl,
                    inflight: self.inflight.clone(),
                    counters: self.counters.clone(),
                };
                tokio::spawn(call.run(fetch, tx));
            }
            None => {
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("coalesced");
                tracing::debug!(cache_key = %key, "Joined in-flight request");
            }
        }

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(published) => published.clone(),
            Err(_) => None,
        };
        outcome.unwrap_or_else(|| Err(ForwardError::Abandoned(key.to_string())))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            store: self.store.name(),
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            store_errors: self.counters.store_errors.load(Ordering::Relaxed),
            in_flight: self.inflight.len(),
        }
    }
}

/// The leader side of one coalescing group.
struct InflightCall {
    key: String,
    registered: watch::Receiver<Option<SharedOutcome>>,
    store: Arc<dyn CacheStore>,
    default_ttl: Duration,
    inflight: Arc<InflightMap>,
    counters: Arc<CacheCounters>,
}

impl InflightCall {
    async fn run<F>(self, fetch: F, tx: watch::Sender<Option<SharedOutcome>>)
    where
        F: Future<Output = Result<UpstreamResponse, ForwardError>>,
    {
        // A caller whose lookup raced the previous group's write can land
        // here after that group unregistered; the store already has the entry.
        let outcome = match self.recheck().await {
            Some(cached) => {
                tracing::debug!(cache_key = %self.key, "Filled by previous in-flight request");
                Ok(Arc::new(cached))
            }
            None => {
                let outcome = fetch.await.map(Arc::new);
                if let Ok(response) = &outcome {
                    self.populate(response).await;
                }
                outcome
            }
        };

        // Unregister before publishing so late arrivals read the store
        // instead of joining a finished group.
        self.unregister();
        tx.send_replace(Some(outcome));
    }

    async fn recheck(&self) -> Option<UpstreamResponse> {
        match self.store.get(&self.key).await {
            Ok(Some(bytes)) => UpstreamResponse::decode(&bytes),
            Ok(None) => None,
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("store_error");
                tracing::warn!(cache_key = %self.key, store = self.store.name(), error = %e, "Cache recheck failed");
                None
            }
        }
    }

    /// Remove this call's entry, leaving any newer group for the key alone.
    fn unregister(&self) {
        self.inflight
            .remove_if(&self.key, |_, rx| rx.same_channel(&self.registered));
    }

    async fn populate(&self, response: &UpstreamResponse) {
        let ttl = response_ttl(response, self.default_ttl);
        if !should_store(response, ttl) {
            tracing::debug!(cache_key = %self.key, status = %response.status, "Response not stored");
            return;
        }

        let bytes = match response.encode() {
            Ok(bytes) => Bytes::from(bytes),
            Err(e) => {
                tracing::warn!(cache_key = %self.key, error = %e, "Failed to encode cached response");
                return;
            }
        };

        match self.store.set(&self.key, bytes, ttl).await {
            Ok(()) => {
                self.counters.stores.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(cache_key = %self.key, ttl_secs = ttl.as_secs(), "Response cached");
            }
            Err(e) => {
                self.counters.store_errors.fetch_add(1, Ordering::Relaxed);
                metrics::record_cache_event("store_error");
                tracing::warn!(cache_key = %self.key, store = self.store.name(), error = %e, "Cache store failed");
            }
        }
    }
}

impl Drop for InflightCall {
    fn drop(&mut self) {
        // Covers a panicking fetch; a no-op after a normal run.
        self.unregister();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryStore;
    use crate::cache::store::CacheError;
    use async_trait::async_trait;
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use std::sync::atomic::AtomicUsize;

    /// Wraps a store and counts calls; optionally fails every call.
    #[derive(Default)]
    struct CountingStore {
        inner: MemoryStore,
        gets: AtomicUsize,
        sets: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CacheStore for CountingStore {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
            self.gets.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CacheError::Unavailable("down".into()));
            }
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
            self.sets.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(CacheError::Unavailable("down".into()));
            }
            self.inner.set(key, value, ttl).await
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn ok_response(body: &'static str) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        headers.insert("cache-control", HeaderValue::from_static("max-age=60"));
        UpstreamResponse {
            status: StatusCode::OK,
            headers,
            body: Bytes::from_static(body.as_bytes()),
        }
    }

    #[tokio::test]
    async fn test_concurrent_misses_collapse_into_one_call() {
        let store = Arc::new(CountingStore::default());
        let coordinator = Arc::new(CacheCoordinator::new(store.clone(), Duration::from_secs(10)));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let coordinator = coordinator.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                coordinator
                    .fetch_coalesced("http://p/item", async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, ForwardError>(ok_response("payload"))
                    })
                    .await
            }));
        }

        for handle in handles {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.body, Bytes::from_static(b"payload"));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.stats().coalesced, 15);
        assert_eq!(coordinator.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_stale_miss_after_previous_call_does_not_refetch() {
        let store = Arc::new(CountingStore::default());
        let coordinator = CacheCoordinator::new(store.clone(), Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));

        // A caller whose lookup missed just before the previous group stored
        // its response reaches fetch_coalesced after that group is gone.
        assert!(coordinator.lookup("k").await.is_none());
        let first_calls = calls.clone();
        coordinator
            .fetch_coalesced("k", async move {
                first_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ForwardError>(ok_response("v1"))
            })
            .await
            .unwrap();

        let second_calls = calls.clone();
        let response = coordinator
            .fetch_coalesced("k", async move {
                second_calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ForwardError>(ok_response("v2"))
            })
            .await
            .unwrap();

        assert_eq!(response.body, Bytes::from_static(b"v1"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_lookup_after_fetch_hits() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = CacheCoordinator::new(store, Duration::from_secs(10));

        assert!(coordinator.lookup("k").await.is_none());
        coordinator
            .fetch_coalesced("k", async { Ok::<_, ForwardError>(ok_response("v")) })
            .await
            .unwrap();

        let hit = coordinator.lookup("k").await.unwrap();
        assert_eq!(hit.body, Bytes::from_static(b"v"));
        assert_eq!(coordinator.stats().hits, 1);
        assert_eq!(coordinator.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_errors_are_shared_and_not_stored() {
        let store = Arc::new(CountingStore::default());
        let coordinator = CacheCoordinator::new(store.clone(), Duration::from_secs(10));

        let err = coordinator
            .fetch_coalesced("k", async {
                Err::<UpstreamResponse, _>(ForwardError::Upstream {
                    backend: "b".into(),
                    reason: "refused".into(),
                })
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Upstream { .. }));
        assert_eq!(store.sets.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_store_failures_degrade_silently() {
        let store = Arc::new(CountingStore {
            fail: true,
            ..CountingStore::default()
        });
        let coordinator = CacheCoordinator::new(store.clone(), Duration::from_secs(10));

        assert!(coordinator.lookup("k").await.is_none());
        let response = coordinator
            .fetch_coalesced("k", async { Ok::<_, ForwardError>(ok_response("v")) })
            .await
            .unwrap();

        assert_eq!(response.body, Bytes::from_static(b"v"));
        assert_eq!(store.sets.load(Ordering::SeqCst), 1);
        // lookup, recheck and set each failed
        assert_eq!(coordinator.stats().store_errors, 3);
    }

    #[tokio::test]
    async fn test_panicking_fetch_releases_waiters() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = CacheCoordinator::new(store, Duration::from_secs(10));

        let err = coordinator
            .fetch_coalesced("k", async {
                if true {
                    panic!("backend exploded");
                }
                Ok::<_, ForwardError>(ok_response("unreachable"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, ForwardError::Abandoned(_)));
        assert_eq!(coordinator.stats().in_flight, 0);
    }
}
