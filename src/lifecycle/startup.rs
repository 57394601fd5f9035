//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order
//! - Build the pooled upstream client
//! - Connect the cache store, falling back to uncached operation
//! - Bind listeners and begin accepting traffic
//! - Wait for a signal, then drain within a deadline

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use tokio::net::TcpListener;

use crate::admin::{setup_admin_router, AdminState};
use crate::cache::{CacheStore, MemoryStore, RedisStore};
use crate::config::{CacheConfig, CacheStoreKind, ClientConfig, ProxyConfig};
use crate::http::{HttpServer, UpstreamClient};
use crate::lifecycle::{signals, Shutdown};
use crate::net::tls::load_tls_config;
use crate::observability::metrics;

const STORE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid address `{address}`: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load TLS configuration: {0}")]
    Tls(#[source] std::io::Error),

    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Pooled keep-alive client shared by every backend call.
pub fn build_http_client(config: &ClientConfig) -> UpstreamClient {
    let mut connector = HttpConnector::new();
    connector.set_nodelay(true);

    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(config.max_idle_per_host)
        .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .build(connector)
}

/// Open the configured cache store.
///
/// Returns `None` when caching is disabled or the store cannot be reached.
pub async fn connect_store(config: &CacheConfig) -> Option<Arc<dyn CacheStore>> {
    if !config.enabled {
        tracing::info!("Response cache disabled");
        return None;
    }

    match config.store {
        CacheStoreKind::Memory => {
            tracing::info!(store = "memory", "Response cache enabled");
            Some(Arc::new(MemoryStore::new()))
        }
        CacheStoreKind::Redis => {
            let connect = RedisStore::connect(&config.redis_url, config.key_prefix.clone());
            match tokio::time::timeout(STORE_CONNECT_TIMEOUT, connect).await {
                Ok(Ok(store)) => {
                    tracing::info!(store = "redis", "Response cache enabled");
                    Some(Arc::new(store))
                }
                Ok(Err(e)) => {
                    tracing::warn!(url = %config.redis_url, error = %e, "Cache store unavailable, serving uncached");
                    None
                }
                Err(_) => {
                    tracing::warn!(url = %config.redis_url, timeout = ?STORE_CONNECT_TIMEOUT, "Cache store connect timed out, serving uncached");
                    None
                }
            }
        }
    }
}

fn parse_addr(address: &str) -> Result<SocketAddr, StartupError> {
    address.parse().map_err(|e: std::net::AddrParseError| StartupError::InvalidAddress {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address).await.map_err(|source| StartupError::Bind {
        address: address.to_string(),
        source,
    })
}

/// Run the proxy until a termination signal arrives.
pub async fn run(config: ProxyConfig) -> Result<(), StartupError> {
    tracing::info!(
        bind_address = %config.listener.bind_address,
        mode = %config.load_balancing.mode,
        backends = ?config.backends,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = parse_addr(&config.observability.metrics_address)?;
        metrics::init_metrics(addr);
    }

    let client = build_http_client(&config.client);
    let store = connect_store(&config.cache).await;
    let shutdown = Shutdown::new();

    let server = HttpServer::new(config.clone(), client, store);

    if config.admin.enabled {
        let listener = bind(&config.admin.bind_address).await?;
        let state = AdminState::new(
            server.registry(),
            server.cache(),
            config.load_balancing.mode,
            config.admin.api_key.clone(),
        );
        let app = setup_admin_router(state);
        let mut rx = shutdown.subscribe();
        tracing::info!(address = %config.admin.bind_address, "Admin API listening");
        tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = rx.recv().await;
                })
                .await;
            if let Err(e) = served {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let rx = shutdown.subscribe();
    let mut handle = match &config.listener.tls {
        Some(tls) => {
            let addr = parse_addr(&config.listener.bind_address)?;
            let tls = load_tls_config(tls).await.map_err(StartupError::Tls)?;
            tokio::spawn(server.run_tls(addr, tls, rx))
        }
        None => {
            let listener = bind(&config.listener.bind_address).await?;
            tokio::spawn(server.run(listener, rx))
        }
    };

    tokio::select! {
        joined = &mut handle => {
            shutdown.trigger();
            return flatten(joined);
        }
        _ = signals::shutdown_signal() => shutdown.trigger(),
    }

    match tokio::time::timeout(DRAIN_TIMEOUT, handle).await {
        Ok(joined) => flatten(joined),
        Err(_) => {
            tracing::warn!(timeout = ?DRAIN_TIMEOUT, "Drain deadline exceeded, exiting");
            Ok(())
        }
    }
}

fn flatten(
    joined: Result<Result<(), std::io::Error>, tokio::task::JoinError>,
) -> Result<(), StartupError> {
    match joined {
        Ok(result) => result.map_err(StartupError::Server),
        Err(e) => Err(StartupError::Server(std::io::Error::other(e))),
    }
}
