//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single upstream server
//! - Hold live statistics (weight, EMA latency, counters)
//! - Track the most recent degraded observation for soft exclusion
//!
//! Every statistic is an independent atomic. Readers may observe an old or a
//! new value for each field, but never a torn one.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use url::Url;

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Position in the registry. Stable for the process lifetime.
    pub index: usize,
    /// Endpoint as configured (e.g. "localhost:8081" or "http://10.0.0.2:80").
    pub endpoint: String,
    /// Parsed base URL, `None` when the endpoint is malformed.
    pub base_url: Option<Url>,

    /// Selection weight (always >= 1).
    weight: AtomicU32,
    /// Exponential moving average of response time in milliseconds (always >= 1).
    avg_latency_ms: AtomicU64,
    /// Completed backend calls.
    total_responses: AtomicU64,
    /// Calls routed to this backend.
    request_count: AtomicU64,
    /// Milliseconds since `created_at` of the last degraded sample, plus one.
    /// Zero means "never degraded".
    last_degraded: AtomicU64,
    created_at: Instant,
}

impl Backend {
    /// Create a backend with weight 1 and latency 1.
    pub fn new(index: usize, endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let base_url = parse_endpoint(&endpoint);
        if base_url.is_none() {
            tracing::warn!(backend = %endpoint, "Invalid backend address");
        }
        Self {
            index,
            endpoint,
            base_url,
            weight: AtomicU32::new(1),
            avg_latency_ms: AtomicU64::new(1),
            total_responses: AtomicU64::new(0),
            request_count: AtomicU64::new(0),
            last_degraded: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn weight(&self) -> u32 {
        self.weight.load(Ordering::Relaxed)
    }

    /// Store a new weight, clamped to the floor of 1.
    pub fn set_weight(&self, weight: u32) {
        self.weight.store(weight.max(1), Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> u64 {
        self.avg_latency_ms.load(Ordering::Acquire)
    }

    pub fn total_responses(&self) -> u64 {
        self.total_responses.load(Ordering::Acquire)
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Count a call routed to this backend.
    pub fn record_request(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Fold a latency sample into the average.
    ///
    /// `fold` receives the previous average and whether this is the first
    /// sample; its result is clamped to >= 1.
    pub(crate) fn update_latency(&self, fold: impl Fn(u64, bool) -> u64) {
        let first = self.total_responses.load(Ordering::Acquire) == 0;
        // The closure never returns None, so the update cannot fail.
        let _ = self
            .avg_latency_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                Some(fold(prev, first).max(1))
            });
        self.total_responses.fetch_add(1, Ordering::AcqRel);
    }

    /// Stamp a degraded observation at `at`.
    pub fn mark_degraded(&self, at: Instant) {
        let offset = at.saturating_duration_since(self.created_at).as_millis() as u64;
        self.last_degraded.store(offset + 1, Ordering::Relaxed);
    }

    /// Time of the most recent degraded observation, if any.
    pub fn last_degraded_at(&self) -> Option<Instant> {
        match self.last_degraded.load(Ordering::Relaxed) {
            0 => None,
            stamp => Some(self.created_at + Duration::from_millis(stamp - 1)),
        }
    }

    /// True when latency exceeds `threshold_ms` and the last degraded
    /// observation happened within `window` of `now`.
    pub fn is_degraded(&self, now: Instant, threshold_ms: u64, window: Duration) -> bool {
        if self.avg_latency_ms() <= threshold_ms {
            return false;
        }
        self.last_degraded_at()
            .map(|at| now.saturating_duration_since(at) < window)
            .unwrap_or(false)
    }
}

/// Parse an endpoint, defaulting to `http://` when no scheme is given.
fn parse_endpoint(endpoint: &str) -> Option<Url> {
    let candidate = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    let url = Url::parse(&candidate).ok()?;
    url.host_str()?;
    Some(url)
}
