//! HTTP server setup and the proxy request path.
//!
//! # Responsibilities
//! - Create the Axum router with a catch-all proxy handler
//! - Wire up middleware (timeout, request ID, tracing)
//! - Serve plain TCP or TLS with graceful shutdown
//! - Start the weight adjuster and status reporter alongside the listener
//! - Drive each request through cache lookup, coalescing and forwarding

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{request::Parts, Request},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::{policy, CacheCoordinator, CacheStore};
use crate::config::{LoadBalancingMode, ProxyConfig};
use crate::http::forward::{ForwardError, Forwarder, UpstreamClient};
use crate::http::request::{request_id, UuidRequestId};
use crate::http::response::UpstreamResponse;
use crate::load_balancer::{
    BackendRegistry, LoadBalancer, ResponseTimeTracker, WeightAdjuster, WeightedRoundRobin,
};
use crate::observability::{metrics, status::StatusReporter};

/// Selects a backend and forwards to it.
#[derive(Clone)]
pub struct Upstream {
    registry: Arc<BackendRegistry>,
    balancer: Arc<dyn LoadBalancer>,
    forwarder: Forwarder,
}

impl Upstream {
    pub fn new(
        registry: Arc<BackendRegistry>,
        balancer: Arc<dyn LoadBalancer>,
        forwarder: Forwarder,
    ) -> Self {
        Self {
            registry,
            balancer,
            forwarder,
        }
    }

    /// One selection, one attempt.
    pub async fn dispatch(&self, parts: &Parts, body: Bytes) -> Result<UpstreamResponse, ForwardError> {
        let backend = self
            .balancer
            .next_server(self.registry.snapshot())
            .ok_or(ForwardError::NoBackends)?;
        self.forwarder.forward(parts, body, &backend).await
    }
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub upstream: Upstream,
    pub cache: Option<Arc<CacheCoordinator>>,
    /// Scheme clients used to reach the proxy, part of every cache key.
    pub scheme: &'static str,
    pub max_body_bytes: usize,
}

/// HTTP server for the reverse proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
    registry: Arc<BackendRegistry>,
    cache: Option<Arc<CacheCoordinator>>,
}

impl HttpServer {
    /// Build the server. `store` is `None` when caching is off or unavailable.
    pub fn new(
        config: ProxyConfig,
        client: UpstreamClient,
        store: Option<Arc<dyn CacheStore>>,
    ) -> Self {
        let registry = Arc::new(BackendRegistry::new(config.backends.iter().cloned()));
        let balancer: Arc<dyn LoadBalancer> =
            Arc::new(WeightedRoundRobin::from_config(&config.load_balancing));
        let tracker = ResponseTimeTracker::from_config(&config.load_balancing);
        let forwarder = Forwarder::new(
            client,
            Duration::from_secs(config.client.timeout_secs),
            config.cache.max_body_bytes,
            tracker,
            registry.clone(),
        );

        let cache = store.map(|store| {
            Arc::new(CacheCoordinator::new(
                store,
                Duration::from_secs(config.cache.default_ttl_secs),
            ))
        });

        let state = AppState {
            upstream: Upstream::new(registry.clone(), balancer, forwarder),
            cache: cache.clone(),
            scheme: if config.listener.tls.is_some() { "https" } else { "http" },
            max_body_bytes: config.cache.max_body_bytes,
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            registry,
            cache,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                    .layer(TraceLayer::new_for_http())
                    .layer(PropagateRequestIdLayer::x_request_id())
                    .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs))),
            )
    }

    pub fn registry(&self) -> Arc<BackendRegistry> {
        self.registry.clone()
    }

    pub fn cache(&self) -> Option<Arc<CacheCoordinator>> {
        self.cache.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            mode = %self.config.load_balancing.mode,
            backends = self.registry.len(),
            cache = self.cache.is_some(),
            "HTTP server starting"
        );

        self.spawn_background(&shutdown);

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server over TLS on `addr`.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        tracing::info!(
            address = %addr,
            mode = %self.config.load_balancing.mode,
            backends = self.registry.len(),
            cache = self.cache.is_some(),
            "HTTPS server starting"
        );

        self.spawn_background(&shutdown);

        let handle = axum_server::Handle::new();
        let stopper = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            stopper.graceful_shutdown(Some(Duration::from_secs(30)));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    fn spawn_background(&self, shutdown: &broadcast::Receiver<()>) {
        if self.config.load_balancing.mode == LoadBalancingMode::WeightedRoundRobin {
            let adjuster = WeightAdjuster::new(self.registry.clone(), &self.config.load_balancing);
            tokio::spawn(adjuster.run(shutdown.resubscribe()));
        }

        let interval = self.config.observability.status_interval_secs;
        if interval > 0 {
            let reporter = StatusReporter::new(self.registry.clone(), Duration::from_secs(interval));
            tokio::spawn(reporter.run(shutdown.resubscribe()));
        }
    }
}

/// Main proxy handler.
///
/// Cacheable requests are served from the store when possible; misses for
/// the same key share one backend call. Everything else goes straight to
/// the selected backend.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request).to_string();
    let method = request.method().to_string();

    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            let err = ForwardError::RequestBody(e.to_string());
            metrics::record_request(&method, err.status().as_u16(), "bypass", start);
            return err.into_response();
        }
    };

    let cache = state
        .cache
        .as_ref()
        .filter(|_| policy::is_cacheable(&parts.method, &parts.headers));

    let Some(cache) = cache else {
        tracing::debug!(request_id = %request_id, method = %method, path = %parts.uri.path(), "Forwarding");
        return match state.upstream.dispatch(&parts, body).await {
            Ok(response) => {
                metrics::record_request(&method, response.status.as_u16(), "bypass", start);
                response.to_response(None)
            }
            Err(err) => error_response(&request_id, &method, "bypass", err, start),
        };
    };

    let key = policy::cache_key(&parts, state.scheme);
    if let Some(hit) = cache.lookup(&key).await {
        tracing::debug!(request_id = %request_id, cache_key = %key, "Cache hit");
        metrics::record_request(&method, hit.status.as_u16(), "hit", start);
        return hit.to_response(Some("HIT"));
    }

    let upstream = state.upstream.clone();
    let fetch = async move { upstream.dispatch(&parts, body).await };
    match cache.fetch_coalesced(&key, fetch).await {
        Ok(response) => {
            metrics::record_request(&method, response.status.as_u16(), "miss", start);
            response.to_response(Some("MISS"))
        }
        Err(err) => error_response(&request_id, &method, "miss", err, start),
    }
}

fn error_response(
    request_id: &str,
    method: &str,
    cache: &'static str,
    err: ForwardError,
    start: Instant,
) -> Response {
    let status = err.status();
    tracing::error!(request_id = %request_id, status = %status, error = %err, "Upstream error");
    metrics::record_request(method, status.as_u16(), cache, start);
    err.into_response()
}
