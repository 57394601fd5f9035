//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, alpha within (0, 1])
//! - Check that the selected cache store is reachable by configuration
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use crate::config::schema::{CacheStoreKind, ProxyConfig};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("at least one backend is required")]
    NoBackends,

    #[error("invalid bind address `{0}`")]
    BindAddress(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("ema_alpha must be within (0, 1], got {0}")]
    Alpha(f64),

    #[error("cache.redis_url must be set when the redis store is selected")]
    RedisUrl,

    #[error("admin.api_key must be set when the admin API is enabled")]
    AdminKey,
}

pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    let lb = &config.load_balancing;
    let positive = [
        ("load_balancing.adjust_interval_ms", lb.adjust_interval_ms),
        ("load_balancing.weight_scale", lb.weight_scale),
        ("load_balancing.degraded_window_secs", lb.degraded_window_secs),
        ("client.timeout_secs", config.client.timeout_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if !(lb.ema_alpha > 0.0 && lb.ema_alpha <= 1.0) {
        errors.push(ValidationError::Alpha(lb.ema_alpha));
    }

    if config.cache.enabled
        && config.cache.store == CacheStoreKind::Redis
        && config.cache.redis_url.trim().is_empty()
    {
        errors.push(ValidationError::RedisUrl);
    }

    if config.admin.enabled && config.admin.api_key.trim().is_empty() {
        errors.push(ValidationError::AdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
