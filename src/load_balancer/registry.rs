//! Backend registry.
//!
//! # Responsibilities
//! - Own the fixed, ordered set of backends for the process lifetime
//! - Hand out a concurrently-safe view for selection
//! - Route statistic mutations to the canonical backend entry
//!
//! The list shape is immutable after construction, so it is shared without a
//! lock. Mutable statistics live in per-backend atomics.

use std::sync::Arc;
use crate::load_balancer::backend::Backend;

/// The fixed pool of backends.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    /// Build the registry from an ordered list of endpoint addresses.
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backends = endpoints
            .into_iter()
            .enumerate()
            .map(|(index, endpoint)| Arc::new(Backend::new(index, endpoint)))
            .collect::<Vec<_>>();

        tracing::debug!(backend_count = backends.len(), "Backend registry built");
        Self { backends }
    }

    /// All backends in configuration order.
    pub fn snapshot(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Apply `f` to the backend at `index`.
    pub fn with_backend<R>(&self, index: usize, f: impl FnOnce(&Backend) -> R) -> Option<R> {
        self.backends.get(index).map(|b| f(b))
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
