//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define proxy metrics (requests, latency, cache events, weights)
//! - Expose Prometheus-compatible metrics endpoint
//! - Track per-backend and aggregate metrics
//!
//! # Metrics
//! - `proxy_requests_total` (counter): requests by method, status, cache path
//! - `proxy_backend_requests_total` (counter): calls routed per backend
//! - `proxy_request_duration_seconds` (histogram): end-to-end latency
//! - `proxy_cache_events_total` (counter): hit, miss, coalesced, store_error
//! - `proxy_backend_weight` (gauge): current selection weight
//! - `proxy_backend_latency_ms` (gauge): EMA response time
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;
use std::time::Instant;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed client request. `cache` is "hit", "miss" or "bypass".
pub fn record_request(method: &str, status: u16, cache: &'static str, start: Instant) {
    counter!(
        "proxy_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "cache" => cache
    )
    .increment(1);
    histogram!("proxy_request_duration_seconds", "method" => method.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_backend_request(backend: &str) {
    counter!("proxy_backend_requests_total", "backend" => backend.to_string()).increment(1);
}

pub fn record_cache_event(event: &'static str) {
    counter!("proxy_cache_events_total", "event" => event).increment(1);
}

pub fn record_backend_weight(backend: &str, weight: u32) {
    gauge!("proxy_backend_weight", "backend" => backend.to_string()).set(f64::from(weight));
}

pub fn record_backend_latency(backend: &str, avg_latency_ms: u64) {
    gauge!("proxy_backend_latency_ms", "backend" => backend.to_string()).set(avg_latency_ms as f64);
}
