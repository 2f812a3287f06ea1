//! Configuration loading and representation.
//!
//! Values come from built-in defaults overridden by `STOCKLEDGER_*`
//! environment variables (`STOCKLEDGER_BIND_ADDR`, `STOCKLEDGER_DATABASE_URL`,
//! `STOCKLEDGER_REDIS_URL`, `STOCKLEDGER_STATUS_POLICY`, the `*_TTL_SECS` knobs).

use std::collections::HashMap;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use stockledger_inventory::TransitionPolicy;

pub const ENV_PREFIX: &str = "STOCKLEDGER";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// TTLs of the cached views, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub items_secs: u64,
    pub stats_secs: u64,
    pub months_secs: u64,
    pub warehouses_secs: u64,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            items_secs: 3600,
            stats_secs: 1800,
            months_secs: 3600,
            warehouses_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bind_addr: String,
    #[serde(default)]
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    #[serde(default)]
    pub redis_url: Option<String>,
    pub redis_namespace: String,
    pub status_policy: String,
    pub items_ttl_secs: u64,
    pub stats_ttl_secs: u64,
    pub months_ttl_secs: u64,
    pub warehouses_ttl_secs: u64,
}

impl AppConfig {
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn redis_url(&self) -> Option<&str> {
        self.redis_url.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn transition_policy(&self) -> Result<TransitionPolicy, AppConfigError> {
        self.status_policy
            .parse()
            .map_err(|e| AppConfigError::Invalid(format!("status_policy: {e}")))
    }

    pub fn cache_ttls(&self) -> CacheTtls {
        CacheTtls {
            items_secs: self.items_ttl_secs,
            stats_secs: self.stats_ttl_secs,
            months_secs: self.months_ttl_secs,
            warehouses_secs: self.warehouses_ttl_secs,
        }
    }

    fn validate(&self) -> Result<(), AppConfigError> {
        self.transition_policy()?;
        if self.database_max_connections == 0 {
            return Err(AppConfigError::Invalid(
                "database_max_connections must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let ttls = CacheTtls::default();
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            database_max_connections: 10,
            redis_url: None,
            redis_namespace: "stockledger".to_string(),
            status_policy: "permissive".to_string(),
            items_ttl_secs: ttls.items_secs,
            stats_ttl_secs: ttls.stats_secs,
            months_ttl_secs: ttls.months_secs,
            warehouses_ttl_secs: ttls.warehouses_secs,
        }
    }
}

/// Load configuration from the process environment.
pub fn load_config() -> Result<AppConfig, AppConfigError> {
    load_config_from(None)
}

/// Load configuration from an explicit variable map (`None` = process env).
pub fn load_config_from(vars: Option<HashMap<String, String>>) -> Result<AppConfig, AppConfigError> {
    let defaults = AppConfig::default();
    let config = Config::builder()
        .set_default("bind_addr", defaults.bind_addr)?
        .set_default("database_max_connections", defaults.database_max_connections)?
        .set_default("redis_namespace", defaults.redis_namespace)?
        .set_default("status_policy", defaults.status_policy)?
        .set_default("items_ttl_secs", defaults.items_ttl_secs)?
        .set_default("stats_ttl_secs", defaults.stats_ttl_secs)?
        .set_default("months_ttl_secs", defaults.months_ttl_secs)?
        .set_default("warehouses_ttl_secs", defaults.warehouses_ttl_secs)?
        .add_source(Environment::with_prefix(ENV_PREFIX).source(vars))
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;
    app_config.validate()?;

    info!(
        bind_addr = %app_config.bind_addr,
        postgres = app_config.database_url().is_some(),
        redis = app_config.redis_url().is_some(),
        status_policy = %app_config.status_policy,
        "configuration loaded"
    );
    Ok(app_config)
}
