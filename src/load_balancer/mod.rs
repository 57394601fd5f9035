//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Cache miss or uncacheable request
//!     → registry.rs (fixed backend list)
//!     → weighted.rs (weighted round robin, skip degraded)
//!     → forwarder issues the call
//!     → tracker.rs (EMA latency after each call)
//!
//! Independently, every interval:
//!     adjuster.rs → weight = max(1, K / (latency + S))
//! ```
//!
//! # Design Decisions
//! - The pool is fixed for the process lifetime
//! - Statistics are per-backend atomics; selection never takes a lock
//! - Round-robin mode is weighted round robin with every weight pinned at 1

pub mod adjuster;
pub mod backend;
pub mod registry;
pub mod tracker;
pub mod weighted;

use std::sync::Arc;
use self::backend::Backend;

pub use adjuster::WeightAdjuster;
pub use registry::BackendRegistry;
pub use tracker::ResponseTimeTracker;
pub use weighted::WeightedRoundRobin;

/// Backend selection strategy.
pub trait LoadBalancer: Send + Sync + std::fmt::Debug {
    /// Pick the backend for the next request. `None` only for an empty pool.
    fn next_server(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;
}
