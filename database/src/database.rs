//! # PostgreSQL Connection Management
//!
//! Builds the SQLx connection pool for the PostgreSQL store and exposes
//! health and pool statistics.

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{debug, error, info, instrument};

use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, DatabaseResult};
use crate::migrations::{MigrationManager, MigrationResult};

/// Database manager for PostgreSQL operations
pub struct DatabaseManager {
    pool: PgPool,
    config: DatabaseConfig,
}

impl DatabaseManager {
    /// Create a new database manager with the given configuration
    #[instrument(skip(config), fields(max_connections = config.max_connections))]
    pub async fn new(config: DatabaseConfig) -> DatabaseResult<Self> {
        config.validate()?;
        info!("Initializing database connection pool");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout())
            .idle_timeout(config.idle_timeout())
            .max_lifetime(config.max_lifetime())
            .connect(config.connection_url()?)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;

        // Test the connection
        let version: String = sqlx::query_scalar("SELECT version()")
            .fetch_one(&pool)
            .await?;

        info!("Connected to PostgreSQL: {}", version);

        Ok(Self { pool, config })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, config: DatabaseConfig) -> Self {
        Self { pool, config }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply pending schema migrations
    pub async fn migrate(&self) -> DatabaseResult<MigrationResult> {
        MigrationManager::new().run_migrations(&self.pool).await
    }

    /// Check database health
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> DatabaseResult<()> {
        debug!("Performing database health check");

        let result: (i32,) = sqlx::query_as("SELECT 1 as health")
            .fetch_one(&self.pool)
            .await?;

        if result.0 == 1 {
            debug!("Database health check passed");
            Ok(())
        } else {
            error!("Database health check failed");
            Err(DatabaseError::Query(
                "health check returned unexpected result".to_string(),
            ))
        }
    }

    /// Get the current database configuration
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Snapshot of the pool's connection usage
    pub fn pool_stats(&self) -> PoolStats {
        let size = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        PoolStats {
            size,
            idle,
            in_use: size.saturating_sub(idle),
        }
    }
}

/// Connection pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub in_use: u32,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: size={}, idle={}, in_use={}",
            self.size, self.idle, self.in_use
        )
    }
}
