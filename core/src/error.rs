//! Error taxonomy shared across Chainwatch crates.

use thiserror::Error;

/// A rule structure was rejected; `field` names the offending path
/// (for example `triggers[1].metric`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Prefixes the field path, e.g. `metric` becomes `triggers[0].metric`
    pub fn within(mut self, parent: impl AsRef<str>) -> Self {
        self.field = format!("{}.{}", parent.as_ref(), self.field);
        self
    }
}

/// Errors surfaced by the Chainwatch engine
#[derive(Debug, Error)]
pub enum ChainwatchError {
    /// Malformed or disallowed rule shape; never persisted
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The oracle answered but its output is not a valid rule
    #[error("Compilation error: {0}")]
    Compilation(String),

    /// The text-generation oracle is down, rate limited or timed out
    #[error("Oracle unavailable: {0}")]
    OracleUnavailable(String),

    /// The portfolio metrics provider is down or timed out
    #[error("Metrics unavailable: {0}")]
    MetricsUnavailable(String),

    /// The referenced rule or alert does not exist or is not owned by the caller
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ChainwatchError {
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// True for dependency failures that may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChainwatchError::OracleUnavailable(_)
                | ChainwatchError::MetricsUnavailable(_)
                | ChainwatchError::Storage(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ChainwatchError::NotFound { .. })
    }
}

/// Type alias for engine results
pub type ChainwatchResult<T> = Result<T, ChainwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_path() {
        let err = ValidationError::new("metric", "unknown metric 'foo'").within("triggers[2]");
        assert_eq!(err.field, "triggers[2].metric");
        assert_eq!(
            err.to_string(),
            "invalid triggers[2].metric: unknown metric 'foo'"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ChainwatchError::OracleUnavailable("timeout".into()).is_retryable());
        assert!(ChainwatchError::MetricsUnavailable("503".into()).is_retryable());
        assert!(!ChainwatchError::Compilation("no json".into()).is_retryable());
        assert!(!ChainwatchError::not_found("rule").is_retryable());
        assert!(ChainwatchError::not_found("rule").is_not_found());
    }
}
