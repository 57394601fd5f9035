//! Latency-adaptive reverse proxy library.
//!
//! Weighted round-robin over a fixed backend pool, with weights derived from
//! each backend's smoothed response time, a shared GET response cache, and
//! coalescing of concurrent misses for the same URL.

pub mod admin;
pub mod cache;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod net;
pub mod observability;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
