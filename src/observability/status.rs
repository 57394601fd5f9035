//! Periodic backend status report.
//!
//! Logs every backend's routed request count, weight and average latency on
//! a fixed interval until shutdown.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time;
use crate::load_balancer::BackendRegistry;

pub struct StatusReporter {
    registry: Arc<BackendRegistry>,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(registry: Arc<BackendRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    pub fn report(&self) {
        for backend in self.registry.snapshot() {
            tracing::info!(
                backend = %backend.endpoint,
                requests = backend.request_count(),
                responses = backend.total_responses(),
                weight = backend.weight(),
                avg_latency_ms = backend.avg_latency_ms(),
                "Backend status"
            );
        }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => self.report(),
                _ = shutdown.recv() => {
                    tracing::debug!("Status reporter stopping");
                    break;
                }
            }
        }
    }
}
