//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Ordered backend endpoints (e.g. "localhost:8081").
    pub backends: Vec<String>,

    /// Load balancing mode and weighting parameters.
    pub load_balancing: LoadBalancingConfig,

    /// Response cache settings.
    pub cache: CacheConfig,

    /// Upstream HTTP client settings.
    pub client: ClientConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API settings.
    pub admin: AdminConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            backends: vec!["localhost:8081".to_string()],
            load_balancing: LoadBalancingConfig::default(),
            cache: CacheConfig::default(),
            client: ClientConfig::default(),
            timeouts: TimeoutConfig::default(),
            observability: ObservabilityConfig::default(),
            admin: AdminConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Load balancing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadBalancingMode {
    /// Plain rotation; weights stay at 1.
    RoundRobin,
    /// Latency-adaptive weights recomputed by the adjuster.
    WeightedRoundRobin,
}

impl LoadBalancingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancingMode::RoundRobin => "ROUND_ROBIN",
            LoadBalancingMode::WeightedRoundRobin => "WEIGHTED_ROUND_ROBIN",
        }
    }
}

impl fmt::Display for LoadBalancingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalancingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ROUND_ROBIN" => Ok(LoadBalancingMode::RoundRobin),
            "WEIGHTED_ROUND_ROBIN" => Ok(LoadBalancingMode::WeightedRoundRobin),
            other => Err(other.to_string()),
        }
    }
}

/// Load balancing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoadBalancingConfig {
    /// Selection mode. Only WEIGHTED_ROUND_ROBIN runs the weight adjuster.
    pub mode: LoadBalancingMode,

    /// Weight recompute interval in milliseconds.
    pub adjust_interval_ms: u64,

    /// Scaling constant K in `K / (latency + S)`.
    pub weight_scale: u64,

    /// Smoothing constant S (ms) added to every latency.
    pub smoothing_ms: u64,

    /// EMA smoothing factor in (0, 1].
    pub ema_alpha: f64,

    /// Skip backends that are slow and recently degraded.
    pub skip_degraded: bool,

    /// Latency above which a backend counts as degraded (ms).
    pub degraded_threshold_ms: u64,

    /// How long a degraded observation stays fresh (seconds).
    pub degraded_window_secs: u64,
}

impl Default for LoadBalancingConfig {
    fn default() -> Self {
        Self {
            mode: LoadBalancingMode::WeightedRoundRobin,
            adjust_interval_ms: 2000,
            weight_scale: 1000,
            smoothing_ms: 50,
            ema_alpha: 0.5,
            skip_degraded: true,
            degraded_threshold_ms: 5000,
            degraded_window_secs: 10,
        }
    }
}

/// Which cache store backs the response cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStoreKind {
    Redis,
    Memory,
}

/// Response cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Enable GET response caching.
    pub enabled: bool,

    /// Store implementation.
    pub store: CacheStoreKind,

    /// Redis connection URL.
    pub redis_url: String,

    /// Prefix prepended to every key written to the store.
    pub key_prefix: String,

    /// TTL used when the response carries no usable max-age (seconds).
    pub default_ttl_secs: u64,

    /// Largest request or response body buffered by the proxy (bytes).
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: CacheStoreKind::Redis,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "proxy:".to_string(),
            default_ttl_secs: 10,
            max_body_bytes: 8 * 1024 * 1024, // 8MB
        }
    }
}

/// Upstream HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Per-call timeout for backend requests in seconds.
    pub timeout_secs: u64,

    /// Maximum idle pooled connections per backend.
    pub max_idle_per_host: usize,

    /// How long an idle pooled connection is kept (seconds).
    pub idle_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            max_idle_per_host: 1000,
            idle_timeout_secs: 90,
        }
    }
}

/// Timeout configuration for inbound requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Backend status report interval in seconds (0 disables it).
    pub status_interval_secs: u64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            status_interval_secs: 10,
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:9091".to_string(),
        }
    }
}
