//! Periodic weight adjustment.
//!
//! # Responsibilities
//! - Recompute every backend's weight from its EMA latency on a fixed timer
//! - Publish the new weights (logs + gauges)
//! - Exit promptly on shutdown, releasing the ticker
//!
//! ```text
//! weight = max(1, scale / (avg_latency_ms + smoothing_ms))
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use crate::config::LoadBalancingConfig;
use crate::load_balancer::registry::BackendRegistry;
use crate::observability::metrics;

/// Compute the weight for a given average latency.
pub fn weight_for_latency(avg_latency_ms: u64, scale: u64, smoothing_ms: u64) -> u32 {
    let divisor = avg_latency_ms.max(1).saturating_add(smoothing_ms);
    let weight = scale / divisor;
    weight.clamp(1, u64::from(u32::MAX)) as u32
}

pub struct WeightAdjuster {
    registry: Arc<BackendRegistry>,
    interval: Duration,
    scale: u64,
    smoothing_ms: u64,
}

impl WeightAdjuster {
    pub fn new(registry: Arc<BackendRegistry>, config: &LoadBalancingConfig) -> Self {
        Self {
            registry,
            interval: Duration::from_millis(config.adjust_interval_ms),
            scale: config.weight_scale,
            smoothing_ms: config.smoothing_ms,
        }
    }

    /// Recompute all weights once.
    pub fn adjust_once(&self) {
        for backend in self.registry.snapshot() {
            let avg = backend.avg_latency_ms();
            let weight = weight_for_latency(avg, self.scale, self.smoothing_ms);
            backend.set_weight(weight);

            tracing::debug!(
                backend = %backend.endpoint,
                avg_latency_ms = avg,
                weight,
                "Adjusted backend weight"
            );
            metrics::record_backend_weight(&backend.endpoint, weight);
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval_ms = self.interval.as_millis() as u64,
            scale = self.scale,
            smoothing_ms = self.smoothing_ms,
            "Weight adjuster starting"
        );

        let mut ticker = time::interval(self.interval);
        // The first tick completes immediately; weights start at 1 anyway.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.adjust_once();
                }
                _ = shutdown.recv() => {
                    tracing::info!("Weight adjuster received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::tracker::ResponseTimeTracker;

    fn config(interval_ms: u64) -> LoadBalancingConfig {
        LoadBalancingConfig {
            adjust_interval_ms: interval_ms,
            weight_scale: 1000,
            smoothing_ms: 50,
            ..LoadBalancingConfig::default()
        }
    }

    #[test]
    fn test_weight_floor() {
        for avg in [0, 1, 10, 949, 950, 951, 5_000, 1_000_000, u64::MAX] {
            assert!(weight_for_latency(avg, 1000, 50) >= 1, "avg={}", avg);
        }
        assert!(weight_for_latency(0, 1000, 0) >= 1);
    }

    #[test]
    fn test_faster_backends_weigh_more() {
        assert_eq!(weight_for_latency(1, 1000, 50), 19);
        assert_eq!(weight_for_latency(50, 1000, 50), 10);
        assert_eq!(weight_for_latency(450, 1000, 50), 2);
        assert_eq!(weight_for_latency(2000, 1000, 50), 1);
    }

    #[test]
    fn test_adjust_once_applies_to_registry() {
        let registry = Arc::new(BackendRegistry::new(["fast:1", "slow:2"]));
        let tracker = ResponseTimeTracker::new(0.5, 5000);
        tracker.record_latency(&registry.snapshot()[0], 50);
        tracker.record_latency(&registry.snapshot()[1], 450);

        let adjuster = WeightAdjuster::new(registry.clone(), &config(1000));
        adjuster.adjust_once();

        assert_eq!(registry.snapshot()[0].weight(), 10);
        assert_eq!(registry.snapshot()[1].weight(), 2);
    }

    #[tokio::test]
    async fn test_run_adjusts_and_stops_on_shutdown() {
        let registry = Arc::new(BackendRegistry::new(["fast:1"]));
        ResponseTimeTracker::new(0.5, 5000).record_latency(&registry.snapshot()[0], 50);

        let (tx, rx) = broadcast::channel(1);
        let adjuster = WeightAdjuster::new(registry.clone(), &config(20));
        let handle = tokio::spawn(adjuster.run(rx));

        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.snapshot()[0].weight(), 10);

        tx.send(()).unwrap();
        time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("adjuster did not stop")
            .unwrap();
    }
}
