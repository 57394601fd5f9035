//! Cache policy.
//!
//! Decides which requests may use the cache, how keys are formed, how long
//! responses live, and which responses are stored at all.

use std::time::Duration;
use axum::http::{
    header::{CACHE_CONTROL, HOST, PRAGMA},
    request::Parts,
    HeaderMap, Method,
};
use crate::http::response::UpstreamResponse;

/// True for directives such as `no-cache` or `no-store`, case-insensitive.
fn has_directive(headers: &HeaderMap, header: axum::http::HeaderName, directive: &str) -> bool {
    headers
        .get_all(header)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|d| d.trim().eq_ignore_ascii_case(directive))
}

/// A request is cacheable when it is a GET without an explicit no-cache directive.
pub fn is_cacheable(method: &Method, headers: &HeaderMap) -> bool {
    if method != Method::GET {
        return false;
    }
    !(has_directive(headers, CACHE_CONTROL, "no-cache")
        || has_directive(headers, CACHE_CONTROL, "no-store")
        || has_directive(headers, PRAGMA, "no-cache"))
}

/// Full request URL used as the cache key: `scheme://host/path?query`.
pub fn cache_key(parts: &Parts, scheme: &str) -> String {
    let host = parts
        .uri
        .authority()
        .map(|a| a.as_str().to_string())
        .or_else(|| {
            parts
                .headers
                .get(HOST)
                .and_then(|h| h.to_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_default()
        .to_ascii_lowercase();

    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    format!("{}://{}{}", scheme, host, path_and_query)
}

/// TTL from a `Cache-Control` value's `max-age`, else `default`.
///
/// Missing, empty or non-numeric values fall back without error.
pub fn ttl_from_cache_control(value: Option<&str>, default: Duration) -> Duration {
    let Some(value) = value else {
        return default;
    };

    for directive in value.split(',') {
        let mut parts = directive.trim().splitn(2, '=');
        let name = parts.next().unwrap_or_default().trim();
        let Some(arg) = parts.next() else {
            continue;
        };
        if name.eq_ignore_ascii_case("max-age") {
            if let Ok(secs) = arg.trim().trim_matches('"').parse::<u64>() {
                return Duration::from_secs(secs);
            }
        }
    }
    default
}

/// TTL for a backend response.
pub fn response_ttl(response: &UpstreamResponse, default: Duration) -> Duration {
    let value = response
        .headers
        .get(CACHE_CONTROL)
        .and_then(|v| v.to_str().ok());
    ttl_from_cache_control(value, default)
}

/// Whether a backend response may be written to the store.
///
/// Server errors, `no-store`/`private` responses and zero TTLs are served but
/// never stored.
pub fn should_store(response: &UpstreamResponse, ttl: Duration) -> bool {
    if response.status.is_server_error() || ttl.is_zero() {
        return false;
    }
    !(has_directive(&response.headers, CACHE_CONTROL, "no-store")
        || has_directive(&response.headers, CACHE_CONTROL, "private"))
}
