//! # Database Migration System
//!
//! Embedded, versioned schema migrations for the PostgreSQL store. Migration
//! SQL is compiled into the binary; applied versions are recorded with their
//! SHA-256 checksum in `_chainwatch_migrations`, and a PostgreSQL advisory
//! lock keeps concurrent processes from migrating at the same time.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{DatabaseError, DatabaseResult};

/// Advisory lock key shared by every Chainwatch process
const MIGRATION_LOCK_KEY: i64 = 0x6368_6169_6e77;

const MIGRATION_TABLE: &str = "_chainwatch_migrations";

/// A migration compiled into the binary
#[derive(Debug, Clone, Copy)]
pub struct EmbeddedMigration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

impl EmbeddedMigration {
    pub fn checksum(&self) -> String {
        calculate_checksum(self.sql)
    }

    /// Individual statements, with comment lines removed
    fn statements(&self) -> Vec<String> {
        let stripped: String = self
            .sql
            .lines()
            .filter(|line| !line.trim_start().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");

        stripped
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Schema migrations, in version order
pub const MIGRATIONS: &[EmbeddedMigration] = &[EmbeddedMigration {
    version: 1,
    name: "initial_schema",
    sql: include_str!("../migrations/0001_initial_schema.sql"),
}];

/// Migration execution result
#[derive(Debug, Clone, Default, Serialize)]
pub struct MigrationResult {
    pub applied: Vec<i64>,
    pub already_applied: usize,
    pub total_time_ms: u64,
}

/// Calculate checksum for migration content
fn calculate_checksum(content: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Applies [`MIGRATIONS`] to a database
pub struct MigrationManager {
    migrations: &'static [EmbeddedMigration],
}

impl Default for MigrationManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MigrationManager {
    pub fn new() -> Self {
        Self {
            migrations: MIGRATIONS,
        }
    }

    /// Run all pending migrations
    #[instrument(skip(self, pool))]
    pub async fn run_migrations(&self, pool: &PgPool) -> DatabaseResult<MigrationResult> {
        info!("Starting migration run");

        // Advisory locks are per session, so every step runs on one connection.
        let mut conn = pool.acquire().await?;

        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await?;
        debug!("Acquired migration lock");

        let result = self.run_migrations_locked(&mut conn).await;

        if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_KEY)
            .execute(&mut *conn)
            .await
        {
            warn!(error = %e, "Failed to release migration lock");
        }

        match &result {
            Ok(summary) => info!(
                applied = summary.applied.len(),
                already_applied = summary.already_applied,
                "Migration completed successfully"
            ),
            Err(e) => error!("Migration failed: {}", e),
        }

        result
    }

    async fn run_migrations_locked(
        &self,
        conn: &mut PgConnection,
    ) -> DatabaseResult<MigrationResult> {
        let start_time = Instant::now();

        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {MIGRATION_TABLE} (
                version BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                execution_time_ms BIGINT NOT NULL
            )
            "#
        ))
        .execute(&mut *conn)
        .await?;

        let applied: HashMap<i64, String> = sqlx::query_as::<_, (i64, String)>(&format!(
            "SELECT version, checksum FROM {MIGRATION_TABLE} ORDER BY version ASC"
        ))
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();

        let mut result = MigrationResult::default();

        for migration in self.migrations {
            let checksum = migration.checksum();
            match applied.get(&migration.version) {
                Some(recorded) if *recorded == checksum => {
                    result.already_applied += 1;
                }
                Some(_) => {
                    return Err(DatabaseError::Migration(format!(
                        "checksum mismatch for migration {} ({})",
                        migration.version, migration.name
                    )));
                }
                None => {
                    self.apply_migration(conn, migration, &checksum).await?;
                    result.applied.push(migration.version);
                }
            }
        }

        result.total_time_ms = start_time.elapsed().as_millis() as u64;
        Ok(result)
    }

    /// Apply a single migration inside its own transaction
    #[instrument(skip(self, conn, migration, checksum), fields(version = migration.version, name = migration.name))]
    async fn apply_migration(
        &self,
        conn: &mut PgConnection,
        migration: &EmbeddedMigration,
        checksum: &str,
    ) -> DatabaseResult<()> {
        debug!("Applying migration");
        let start_time = Instant::now();

        let mut tx = sqlx::Connection::begin(&mut *conn).await?;

        for statement in migration.statements() {
            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    DatabaseError::Migration(format!(
                        "migration {} ({}) failed: {}",
                        migration.version, migration.name, e
                    ))
                })?;
        }

        sqlx::query(&format!(
            "INSERT INTO {MIGRATION_TABLE} (version, name, checksum, execution_time_ms) VALUES ($1, $2, $3, $4)"
        ))
        .bind(migration.version)
        .bind(migration.name)
        .bind(checksum)
        .bind(start_time.elapsed().as_millis() as i64)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(
            "Successfully applied migration: {} - {}",
            migration.version, migration.name
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_checksum() {
        let content = "CREATE TABLE rules (id UUID PRIMARY KEY);";
        let checksum = calculate_checksum(content);
        assert_eq!(checksum.len(), 64); // SHA256 hex length
        assert_eq!(checksum, calculate_checksum(content));
    }

    #[test]
    fn test_versions_are_strictly_increasing() {
        let versions: Vec<i64> = MIGRATIONS.iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.first(), Some(&1));
    }

    #[test]
    fn test_initial_schema_statements() {
        let statements = MIGRATIONS[0].statements();
        assert!(statements.iter().all(|s| !s.starts_with("--")));
        assert!(statements
            .iter()
            .any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS rules ")));
        assert!(statements
            .iter()
            .any(|s| s.starts_with("CREATE TABLE IF NOT EXISTS alerts ")));
        assert!(statements
            .iter()
            .any(|s| s.contains("ON DELETE CASCADE")));
    }
}
