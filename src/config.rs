//! Application configuration
//!
//! Loaded from `chainwatch.toml` or `config/chainwatch.toml` (both optional)
//! and `CHAINWATCH_*` environment variables, where `__` separates nested keys:
//! `CHAINWATCH_ENGINE__TICK_INTERVAL_SECS=60`.

use alert_engine::{EngineConfig, MetricsProviderConfig};
use chainwatch_database::{DatabaseConfig, StorageBackend};
use config::{Config, ConfigError, Environment, File, FileFormat};
use rule_compiler::OpenRouterConfig;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level Chainwatch configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChainwatchConfig {
    /// Evaluator, scheduler and alert settings
    pub engine: EngineConfig,
    /// Natural-language compiler and oracle settings
    pub compiler: CompilerConfig,
    /// Portfolio metrics service
    pub metrics_provider: MetricsProviderConfig,
    /// Rule store backend
    pub database: DatabaseConfig,
}

/// Natural-language compiler settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// OpenRouter API key; compilation is unavailable without one
    pub api_key: Option<Secret<String>>,
    /// Chat completions base URL
    pub base_url: String,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Seconds to wait for the oracle before giving up
    pub oracle_timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        let openrouter = OpenRouterConfig::default();
        Self {
            api_key: None,
            base_url: openrouter.base_url,
            model: openrouter.model,
            temperature: openrouter.temperature,
            oracle_timeout_secs: openrouter.timeout_secs,
        }
    }
}

impl CompilerConfig {
    /// Oracle timeout as a [`Duration`]
    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_secs)
    }

    /// OpenRouter client settings, or `None` when no API key is configured
    pub fn openrouter(&self) -> Option<OpenRouterConfig> {
        let api_key = self
            .api_key
            .as_ref()
            .filter(|key| !key.expose_secret().trim().is_empty())?;

        Some(OpenRouterConfig {
            api_key: api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            timeout_secs: self.oracle_timeout_secs,
        })
    }
}

impl ChainwatchConfig {
    /// Loads configuration from the default file locations and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Like [`load`](Self::load), with `path` taking precedence over the default files
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .add_source(File::with_name("chainwatch").required(false))
            .add_source(File::with_name("config/chainwatch").required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        let builder = builder
            .add_source(
                Environment::with_prefix("CHAINWATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            // Conventional variable names used by the oracle client and sqlx tooling
            .set_override_option("compiler.api_key", std::env::var("OPENROUTER_API_KEY").ok())?
            .set_override_option("compiler.model", std::env::var("OPENROUTER_MODEL").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?;

        let config: ChainwatchConfig = builder.build()?.try_deserialize()?;
        config.validate()?;

        info!("Configuration loaded:");
        info!("  Tick interval: {}s", config.engine.tick_interval_secs);
        info!("  Worker pool: {}", config.engine.worker_pool_size);
        info!("  Alert cooldown: {}s", config.engine.alert_cooldown_secs);
        info!("  Storage backend: {:?}", config.database.backend);
        info!("  Metrics provider: {}", config.metrics_provider.base_url);
        info!("  Oracle model: {}", config.compiler.model);

        if config.compiler.openrouter().is_none() {
            warn!("No oracle API key configured; rule compilation is disabled");
        }

        Ok(config)
    }

    /// Validates the configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        if self.compiler.oracle_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "compiler.oracle_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.compiler.temperature) {
            return Err(ConfigError::Message(
                "compiler.temperature must be between 0 and 2".to_string(),
            ));
        }
        if self.metrics_provider.base_url.trim().is_empty() {
            return Err(ConfigError::Message(
                "metrics_provider.base_url cannot be empty".to_string(),
            ));
        }
        if self.metrics_provider.timeout_secs == 0 {
            return Err(ConfigError::Message(
                "metrics_provider.timeout_secs must be greater than zero".to_string(),
            ));
        }

        if self.database.backend == StorageBackend::Postgres {
            self.database
                .validate()
                .map_err(|e| ConfigError::Message(e.to_string()))?;
        }

        Ok(())
    }
}
