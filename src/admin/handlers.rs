use std::time::Instant;
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::cache::CacheStats;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub mode: String,
    pub backends: usize,
    pub cache_enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendStatus {
    pub index: usize,
    pub endpoint: String,
    pub weight: u32,
    pub avg_latency_ms: u64,
    pub request_count: u64,
    pub total_responses: u64,
    /// Seconds since the backend last exceeded the degradation threshold.
    pub degraded_secs_ago: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct CacheStatus {
    pub enabled: bool,
    #[serde(flatten)]
    pub stats: Option<CacheStats>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        mode: state.mode.to_string(),
        backends: state.registry.len(),
        cache_enabled: state.cache.is_some(),
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let now = Instant::now();
    let statuses = state
        .registry
        .snapshot()
        .iter()
        .map(|b| BackendStatus {
            index: b.index,
            endpoint: b.endpoint.clone(),
            weight: b.weight(),
            avg_latency_ms: b.avg_latency_ms(),
            request_count: b.request_count(),
            total_responses: b.total_responses(),
            degraded_secs_ago: b
                .last_degraded_at()
                .map(|at| now.saturating_duration_since(at).as_secs()),
        })
        .collect();
    Json(statuses)
}

pub async fn get_cache(State(state): State<AdminState>) -> Json<CacheStatus> {
    Json(CacheStatus {
        enabled: state.cache.is_some(),
        stats: state.cache.as_ref().map(|c| c.stats()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::config::LoadBalancingMode;
    use crate::load_balancer::BackendRegistry;

    fn state() -> AdminState {
        let registry = Arc::new(BackendRegistry::new(["a:1", "b:2"]));
        AdminState::new(registry, None, LoadBalancingMode::WeightedRoundRobin, "key")
    }

    #[tokio::test]
    async fn test_backends_view() {
        let state = state();
        state.registry.snapshot()[1].set_weight(7);

        let Json(backends) = get_backends(State(state)).await;
        assert_eq!(backends.len(), 2);
        assert_eq!(backends[1].endpoint, "b:2");
        assert_eq!(backends[1].weight, 7);
        assert!(backends[0].degraded_secs_ago.is_none());
    }

    #[tokio::test]
    async fn test_cache_view_without_store() {
        let Json(cache) = get_cache(State(state())).await;
        assert!(!cache.enabled);
        assert!(cache.stats.is_none());
    }
}
