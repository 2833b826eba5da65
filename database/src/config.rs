//! # Database Configuration
//!
//! Storage backend selection and PostgreSQL pool settings. Durations are
//! expressed in whole seconds so the structure maps directly onto TOML files
//! and `CHAINWATCH_DATABASE__*` environment variables.

use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use std::time::Duration;

use crate::error::{DatabaseError, DatabaseResult};

/// Which [`RuleStore`](crate::RuleStore) implementation backs the engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local store; state is lost on restart
    #[default]
    Memory,
    Postgres,
}

/// Database configuration for the rule store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    /// PostgreSQL connection URL; required for the postgres backend
    pub url: Option<Secret<String>>,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Minimum number of connections in the pool
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
    /// Apply embedded migrations when the store is opened
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            url: None,
            max_connections: 10,
            min_connections: 1,
            acquire_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
            run_migrations: true,
        }
    }
}

impl DatabaseConfig {
    /// Postgres configuration pointing at `url`
    pub fn postgres(url: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Postgres,
            url: Some(Secret::new(url.into())),
            ..Default::default()
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    /// Connection URL, failing when the postgres backend has none configured
    pub fn connection_url(&self) -> DatabaseResult<&str> {
        self.url
            .as_ref()
            .map(|url| url.expose_secret().as_str())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DatabaseError::Configuration("database url is not set".to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> DatabaseResult<()> {
        if self.backend == StorageBackend::Postgres {
            self.connection_url()?;
        }

        if self.max_connections == 0 {
            return Err(DatabaseError::Configuration(
                "max_connections must be greater than zero".to_string(),
            ));
        }

        if self.max_connections < self.min_connections {
            return Err(DatabaseError::Configuration(
                "max_connections must be >= min_connections".to_string(),
            ));
        }

        Ok(())
    }
}
