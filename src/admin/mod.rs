//! Admin API.
//!
//! Read-only JSON views of backend and cache state, served on a separate
//! listener behind a bearer token.

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use axum::{middleware, routing::get, Router};

use crate::cache::CacheCoordinator;
use crate::config::LoadBalancingMode;
use crate::load_balancer::BackendRegistry;
use self::auth::admin_auth_middleware;
use self::handlers::{get_backends, get_cache, get_status};

/// State shared by admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<BackendRegistry>,
    pub cache: Option<Arc<CacheCoordinator>>,
    pub mode: LoadBalancingMode,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(
        registry: Arc<BackendRegistry>,
        cache: Option<Arc<CacheCoordinator>>,
        mode: LoadBalancingMode,
        api_key: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            registry,
            cache,
            mode,
            api_key: api_key.into(),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/backends", get(get_backends))
        .route("/admin/cache", get(get_cache))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
