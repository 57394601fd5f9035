//! Response-time tracking.
//!
//! Folds each completed backend call into the backend's exponential moving
//! average. The first sample initialises the average directly.

use std::time::Instant;
use crate::config::LoadBalancingConfig;
use crate::load_balancer::backend::Backend;
use crate::observability::metrics;

/// Per-backend EMA latency tracker.
#[derive(Debug, Clone)]
pub struct ResponseTimeTracker {
    /// Smoothing factor in (0, 1]. Higher favours recent samples.
    alpha: f64,
    /// Samples above this latency stamp the backend as degraded.
    degraded_threshold_ms: u64,
}

impl ResponseTimeTracker {
    pub fn new(alpha: f64, degraded_threshold_ms: u64) -> Self {
        Self {
            alpha,
            degraded_threshold_ms,
        }
    }

    pub fn from_config(config: &LoadBalancingConfig) -> Self {
        Self::new(config.ema_alpha, config.degraded_threshold_ms)
    }

    /// Record a latency sample for `backend`.
    pub fn record_latency(&self, backend: &Backend, sample_ms: u64) {
        let alpha = self.alpha;
        backend.update_latency(|prev, first| {
            if first {
                sample_ms
            } else {
                ema(prev, sample_ms, alpha)
            }
        });

        if sample_ms > self.degraded_threshold_ms {
            backend.mark_degraded(Instant::now());
            tracing::warn!(
                backend = %backend.endpoint,
                sample_ms,
                threshold_ms = self.degraded_threshold_ms,
                "Slow backend response"
            );
        }

        metrics::record_backend_latency(&backend.endpoint, backend.avg_latency_ms());
    }
}

fn ema(prev: u64, sample: u64, alpha: f64) -> u64 {
    (prev as f64 * (1.0 - alpha) + sample as f64 * alpha) as u64
}
