//! Request forwarding to a selected backend.
//!
//! # Responsibilities
//! - Rewrite scheme/authority/Host to the backend's endpoint
//! - Issue the call through the pooled client under a fixed timeout
//! - Measure wall-clock latency and feed the response-time tracker
//! - Buffer the response so it can be replayed and cached
//!
//! # Design Decisions
//! - One attempt per request: no retry, no alternate backend
//! - The timeout covers the call and the body read
//! - Latency is recorded only for completed calls

use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::{
    body::{Body, Bytes},
    http::{
        header::HOST,
        request::Parts,
        uri::{Authority, PathAndQuery, Scheme},
        HeaderValue, Request, StatusCode, Uri,
    },
    response::{IntoResponse, Response},
};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use thiserror::Error;
use tokio::time;
use url::Url;

use crate::http::response::{strip_hop_by_hop, UpstreamResponse};
use crate::load_balancer::{backend::Backend, BackendRegistry, ResponseTimeTracker};
use crate::observability::metrics;

/// Pooled HTTP client used for backend calls.
pub type UpstreamClient = Client<HttpConnector, Body>;

/// Errors surfaced by a single forwarding attempt.
///
/// Cloneable so one outcome can be handed to every coalesced waiter.
#[derive(Debug, Clone, Error)]
pub enum ForwardError {
    #[error("no backends available")]
    NoBackends,

    #[error("invalid backend address `{0}`")]
    InvalidBackendAddress(String),

    #[error("upstream {backend} request failed: {reason}")]
    Upstream { backend: String, reason: String },

    #[error("upstream {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },

    #[error("failed to read request body: {0}")]
    RequestBody(String),

    #[error("in-flight request for `{0}` was abandoned")]
    Abandoned(String),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::NoBackends => StatusCode::SERVICE_UNAVAILABLE,
            ForwardError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::RequestBody(_) => StatusCode::BAD_REQUEST,
            ForwardError::InvalidBackendAddress(_)
            | ForwardError::Upstream { .. }
            | ForwardError::Abandoned(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let message = match self.status() {
            StatusCode::GATEWAY_TIMEOUT => "Upstream request timed out",
            StatusCode::SERVICE_UNAVAILABLE => "No backends available",
            StatusCode::BAD_REQUEST => "Invalid request body",
            _ => "Upstream request failed",
        };
        (self.status(), message).into_response()
    }
}

/// Forwards requests and records their latency.
#[derive(Clone)]
pub struct Forwarder {
    client: UpstreamClient,
    timeout: Duration,
    max_body_bytes: usize,
    tracker: ResponseTimeTracker,
    registry: Arc<BackendRegistry>,
}

impl Forwarder {
    pub fn new(
        client: UpstreamClient,
        timeout: Duration,
        max_body_bytes: usize,
        tracker: ResponseTimeTracker,
        registry: Arc<BackendRegistry>,
    ) -> Self {
        Self {
            client,
            timeout,
            max_body_bytes,
            tracker,
            registry,
        }
    }

    /// Send the request described by `parts` and `body` to `backend`.
    ///
    /// Statistics are written to the registry's entry for `backend.index`.
    pub async fn forward(
        &self,
        parts: &Parts,
        body: Bytes,
        backend: &Backend,
    ) -> Result<UpstreamResponse, ForwardError> {
        let request = build_upstream_request(parts, body, backend)?;
        self.registry.with_backend(backend.index, Backend::record_request);
        metrics::record_backend_request(&backend.endpoint);

        let start = Instant::now();
        let result = time::timeout(self.timeout, self.send(request)).await;
        let elapsed = start.elapsed();

        match result {
            Ok(Ok(response)) => {
                self.registry.with_backend(backend.index, |b| {
                    self.tracker.record_latency(b, elapsed.as_millis() as u64)
                });
                tracing::debug!(
                    backend = %backend.endpoint,
                    status = %response.status,
                    latency_ms = elapsed.as_millis() as u64,
                    "Upstream responded"
                );
                Ok(response)
            }
            Ok(Err(reason)) => Err(ForwardError::Upstream {
                backend: backend.endpoint.clone(),
                reason,
            }),
            Err(_) => Err(ForwardError::Timeout {
                backend: backend.endpoint.clone(),
                timeout: self.timeout,
            }),
        }
    }

    async fn send(&self, request: Request<Body>) -> Result<UpstreamResponse, String> {
        let response: hyper::Response<Incoming> =
            self.client.request(request).await.map_err(|e| e.to_string())?;
        let (parts, incoming) = response.into_parts();
        let body = axum::body::to_bytes(Body::new(incoming), self.max_body_bytes)
            .await
            .map_err(|e| e.to_string())?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);

        Ok(UpstreamResponse {
            status: parts.status,
            headers,
            body,
        })
    }
}

/// Build the client-style request aimed at `backend`.
fn build_upstream_request(
    parts: &Parts,
    body: Bytes,
    backend: &Backend,
) -> Result<Request<Body>, ForwardError> {
    let invalid = || ForwardError::InvalidBackendAddress(backend.endpoint.clone());

    let base = backend
        .base_url
        .as_ref()
        .filter(|url| url.scheme() == "http")
        .ok_or_else(invalid)?;
    let authority = Authority::from_str(&authority_of(base).ok_or_else(invalid)?)
        .map_err(|_| invalid())?;

    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.scheme = Some(Scheme::HTTP);
    uri_parts.authority = Some(authority.clone());
    if uri_parts.path_and_query.is_none() {
        uri_parts.path_and_query = Some(PathAndQuery::from_static("/"));
    }
    let uri = Uri::from_parts(uri_parts).map_err(|_| invalid())?;

    let mut headers = parts.headers.clone();
    strip_hop_by_hop(&mut headers);
    let host = HeaderValue::from_str(authority.as_str()).map_err(|_| invalid())?;
    headers.insert(HOST, host);

    let mut request = Request::new(Body::from(body));
    *request.method_mut() = parts.method.clone();
    *request.uri_mut() = uri;
    *request.headers_mut() = headers;
    Ok(request)
}

fn authority_of(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}
