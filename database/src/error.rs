//! Database error types
//!
//! This module provides error types for storage operations and their mapping
//! onto the engine-wide error taxonomy.

use chainwatch_core::ChainwatchError;
use thiserror::Error;

/// Database-related errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),
}

impl DatabaseError {
    pub fn rule_not_found(rule_id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("rule {}", rule_id))
    }

    pub fn alert_not_found(alert_id: impl std::fmt::Display) -> Self {
        DatabaseError::NotFound(format!("alert {}", alert_id))
    }
}

impl From<DatabaseError> for ChainwatchError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(resource) => ChainwatchError::NotFound { resource },
            other => ChainwatchError::Storage(other.to_string()),
        }
    }
}

/// Type alias for database results
pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_engine_not_found() {
        let err: ChainwatchError = DatabaseError::rule_not_found("abc").into();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Resource not found: rule abc");
    }

    #[test]
    fn test_other_errors_map_to_storage() {
        let err: ChainwatchError = DatabaseError::Query("boom".into()).into();
        assert!(matches!(err, ChainwatchError::Storage(_)));
    }
}
