//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use thiserror::Error;
use crate::config::schema::{LoadBalancingMode, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid load balancing mode: {0}")]
    InvalidMode(String),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Source of environment overrides.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// Reads from the process environment.
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

pub const ENV_BIND_ADDRESS: &str = "PROXY_BIND_ADDRESS";
pub const ENV_BACKENDS: &str = "PROXY_BACKENDS";
pub const ENV_LOAD_BALANCING_MODE: &str = "PROXY_LOAD_BALANCING_MODE";
pub const ENV_REDIS_URL: &str = "PROXY_REDIS_URL";

/// Load, apply environment overrides, and validate.
///
/// Without a path the built-in defaults are used as the base.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ProxyConfig::default(),
    };

    apply_env_overrides(&mut config, &ProcessEnv)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment variables onto `config`.
pub fn apply_env_overrides(config: &mut ProxyConfig, env: &dyn EnvSource) -> Result<(), ConfigError> {
    if let Some(addr) = env.var(ENV_BIND_ADDRESS) {
        config.listener.bind_address = addr;
    }

    if let Some(list) = env.var(ENV_BACKENDS) {
        config.backends = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }

    if let Some(mode) = env.var(ENV_LOAD_BALANCING_MODE) {
        config.load_balancing.mode = mode
            .parse::<LoadBalancingMode>()
            .map_err(ConfigError::InvalidMode)?;
    }

    if let Some(url) = env.var(ENV_REDIS_URL) {
        config.cache.redis_url = url;
    }

    Ok(())
}
