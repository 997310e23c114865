//! Layered configuration: optional TOML file, then `AGORA_*` environment.
//!
//! `AGORA_DATABASE__URL=postgres://...` sets `database.url`; a double
//! underscore separates nesting levels.

use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use secrecy::SecretString;
use serde::Deserialize;
use thiserror::Error;

use agora_core::DomainError;
use agora_observability::LogFormat;

use crate::lifecycle::CoordinatorConfig;
use crate::seed::{canonical_seed_groups, validate_seed_groups, SeedGroup};

/// Config file used when `AGORA_CONFIG` is not set.
pub const DEFAULT_CONFIG_FILE: &str = "agora.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] figment::Error),

    #[error("invalid config: {0}")]
    Invalid(#[from] DomainError),
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub url: SecretString,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LifecycleConfig {
    /// Caller-side timeout for store procedures. Unset means wait indefinitely.
    pub procedure_timeout_secs: Option<u64>,
}

impl LifecycleConfig {
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            procedure_timeout: self.procedure_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommunityConfig {
    #[serde(default = "canonical_seed_groups")]
    pub seed_groups: Vec<SeedGroup>,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            seed_groups: canonical_seed_groups(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Absent when running purely in memory.
    pub database: Option<DatabaseConfig>,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub community: CommunityConfig,
}

impl AppConfig {
    /// Load from `$AGORA_CONFIG` (or `agora.toml`) and the environment.
    ///
    /// A missing file is fine; every key can come from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("AGORA_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::from_figment(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed("AGORA_").split("__")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        validate_seed_groups(&config.community.seed_groups)?;
        Ok(config)
    }
}
