//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, request ID, timeout)
//!     → server.rs proxy_handler
//!         cacheable → cache lookup → coalesced fetch
//!         otherwise → select backend
//!     → forward.rs (rewrite, call, measure latency)
//!     → response.rs (replay status, headers, body)
//!     → Send to client
//! ```

pub mod forward;
pub mod request;
pub mod response;
pub mod server;

pub use forward::{ForwardError, Forwarder, UpstreamClient};
pub use request::{UuidRequestId, X_REQUEST_ID};
pub use response::UpstreamResponse;
pub use server::{AppState, HttpServer, Upstream};
