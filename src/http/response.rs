//! Response handling and transformation.
//!
//! # Responsibilities
//! - Hold a fully buffered backend response (status, headers, body)
//! - Replay it to the client with the backend's real status code
//! - Encode/decode the cached envelope stored in the cache store
//!
//! # Design Decisions
//! - Headers are copied entry by entry, repeated names included
//! - Hop-by-hop headers are connection-scoped and never replayed
//! - Cached entries keep status and headers so a hit is indistinguishable from a miss

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

/// Header marking whether a response came from the cache.
pub const X_CACHE: &str = "x-cache";

/// Connection-scoped headers that must not be forwarded.
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
];

/// Strip hop-by-hop headers in place.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    headers.remove(axum::http::header::UPGRADE);
}

/// A buffered response received from a backend.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl UpstreamResponse {
    /// Build the client response, tagging it with `x-cache` when given.
    pub fn to_response(&self, cache_status: Option<&'static str>) -> Response {
        let mut response = Response::new(Body::from(self.body.clone()));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in self.headers.iter() {
            headers.append(name.clone(), value.clone());
        }
        if let Some(tag) = cache_status {
            headers.insert(X_CACHE, HeaderValue::from_static(tag));
        }
        response
    }

    /// Serialize into the cache envelope.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let stored = StoredResponse {
            status: self.status.as_u16(),
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), v.as_bytes().to_vec()))
                .collect(),
            body: self.body.to_vec(),
        };
        serde_json::to_vec(&stored)
    }

    /// Decode a cache envelope. Returns `None` for anything unreadable.
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let stored: StoredResponse = serde_json::from_slice(bytes).ok()?;
        let status = StatusCode::from_u16(stored.status).ok()?;

        let mut headers = HeaderMap::with_capacity(stored.headers.len());
        for (name, value) in stored.headers {
            let name = HeaderName::from_bytes(name.as_bytes()).ok()?;
            let value = HeaderValue::from_bytes(&value).ok()?;
            headers.append(name, value);
        }

        Some(Self {
            status,
            headers,
            body: Bytes::from(stored.body),
        })
    }
}

impl IntoResponse for UpstreamResponse {
    fn into_response(self) -> Response {
        self.to_response(None)
    }
}

#[derive(Serialize, Deserialize)]
struct StoredResponse {
    status: u16,
    headers: Vec<(String, Vec<u8>)>,
    body: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        headers.append("set-cookie", HeaderValue::from_static("a=1"));
        headers.append("set-cookie", HeaderValue::from_static("b=2"));
        UpstreamResponse {
            status: StatusCode::NOT_FOUND,
            headers,
            body: Bytes::from_static(b"missing"),
        }
    }

    #[test]
    fn test_to_response_keeps_status_and_repeated_headers() {
        let response = sample().to_response(Some("MISS"));
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers().get_all("set-cookie").iter().count(), 2);
        assert_eq!(response.headers().get(X_CACHE).unwrap(), "MISS");
        assert_eq!(response.headers().get("content-type").unwrap(), "text/plain");
    }

    #[test]
    fn test_envelope_preserves_response() {
        let original = sample();
        let decoded = UpstreamResponse::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded.status, original.status);
        assert_eq!(decoded.body, original.body);
        assert_eq!(decoded.headers, original.headers);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(UpstreamResponse::decode(b"not json").is_none());
        assert!(UpstreamResponse::decode(br#"{"status":1000,"headers":[],"body":[]}"#).is_none());
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        headers.insert("x-custom", HeaderValue::from_static("1"));
        strip_hop_by_hop(&mut headers);
        assert_eq!(headers.len(), 1);
        assert!(headers.contains_key("x-custom"));
    }
}
