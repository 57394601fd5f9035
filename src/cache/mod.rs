//! Response cache subsystem.
//!
//! # Data Flow
//! ```text
//! GET without no-cache
//!     → policy.rs (cacheable? key = full URL)
//!     → coordinator.rs lookup → store.rs get
//!         hit  → replay stored response
//!         miss → coordinator.rs coalesce → forward → ttl → store.rs set
//! ```
//!
//! # Design Decisions
//! - The store is an external collaborator behind a get/set trait
//! - Store failures never reach the client
//! - Hits bypass the load balancer and latency tracking entirely
//! - Keys are backend-independent; backends must be interchangeable

pub mod coordinator;
pub mod memory;
pub mod policy;
pub mod redis_store;
pub mod store;

pub use coordinator::{CacheCoordinator, CacheStats};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::{CacheError, CacheStore};
