//! Weighted round-robin load balancing strategy.
//!
//! A single monotonically increasing counter is reduced modulo the total
//! weight and walked across the backend list. Over any `total_weight`
//! consecutive picks each backend is chosen exactly `weight` times.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use crate::config::LoadBalancingConfig;
use crate::load_balancer::{LoadBalancer, backend::Backend};

/// Soft-exclusion guard for slow backends.
#[derive(Debug, Clone, Copy)]
pub struct DegradationGuard {
    pub threshold_ms: u64,
    pub window: Duration,
}

/// Weighted round-robin selector.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    counter: AtomicU64,
    guard: Option<DegradationGuard>,
}

impl WeightedRoundRobin {
    pub fn new(guard: Option<DegradationGuard>) -> Self {
        Self {
            counter: AtomicU64::new(0),
            guard,
        }
    }

    pub fn from_config(config: &LoadBalancingConfig) -> Self {
        let guard = config.skip_degraded.then(|| DegradationGuard {
            threshold_ms: config.degraded_threshold_ms,
            window: Duration::from_secs(config.degraded_window_secs),
        });
        Self::new(guard)
    }

    /// Start the counter at `value` (for reproducible sequences).
    pub fn with_counter(self, value: u64) -> Self {
        self.counter.store(value, Ordering::Relaxed);
        self
    }

    /// Select a backend as of `now`.
    pub fn select_at(&self, backends: &[Arc<Backend>], now: Instant) -> Option<Arc<Backend>> {
        let first = backends.first()?;

        let eligible: Vec<&Arc<Backend>> = match self.guard {
            Some(guard) => {
                let healthy: Vec<_> = backends
                    .iter()
                    .filter(|b| !b.is_degraded(now, guard.threshold_ms, guard.window))
                    .collect();
                if healthy.is_empty() {
                    // Excluding everything would leave no one to serve.
                    backends.iter().collect()
                } else {
                    healthy
                }
            }
            None => backends.iter().collect(),
        };

        let total_weight: u64 = eligible.iter().map(|b| u64::from(b.weight())).sum();
        if total_weight == 0 {
            return Some(first.clone());
        }

        let count = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let mut index = count % total_weight;

        for backend in eligible {
            let weight = u64::from(backend.weight());
            if index < weight {
                return Some(backend.clone());
            }
            index -= weight;
        }

        // Unreachable while weights are stable; a concurrent adjustment may
        // shrink weights mid-walk.
        Some(first.clone())
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        self.select_at(backends, Instant::now())
    }
}
