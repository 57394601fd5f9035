//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Config → Logging → Metrics → HTTP client → Cache store
//!     → Admin listener → Proxy listener (+ adjuster, status reporter)
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     Broadcast → listeners stop accepting → background loops exit
//! ```
//!
//! # Design Decisions
//! - Fail fast: bind and TLS errors are fatal
//! - An unreachable cache store is not fatal; the proxy runs uncached
//! - Listeners start last (traffic only when ready)
//! - Draining is bounded by a deadline

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{build_http_client, connect_store, run, StartupError};
