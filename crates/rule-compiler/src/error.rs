//! Compiler and oracle error types

use chainwatch_core::{ChainwatchError, ValidationError};
use thiserror::Error;

/// Failures of the text-generation oracle
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("oracle returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("oracle timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("oracle returned an empty response")]
    EmptyResponse,

    #[error("oracle configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        OracleError::Transport(err.to_string())
    }
}

/// Failures of a single compilation
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("rule text cannot be empty")]
    EmptyInput,

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("oracle response contains no JSON object")]
    NoJson,

    #[error("oracle produced an invalid rule: {0}")]
    Invalid(#[from] ValidationError),
}

impl From<CompileError> for ChainwatchError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Oracle(e) => ChainwatchError::OracleUnavailable(e.to_string()),
            other => ChainwatchError::Compilation(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_mapping() {
        let unavailable: ChainwatchError =
            CompileError::Oracle(OracleError::Status { status: 429, body: "slow down".into() }).into();
        assert!(matches!(unavailable, ChainwatchError::OracleUnavailable(_)));
        assert!(unavailable.is_retryable());

        let invalid: ChainwatchError =
            CompileError::Invalid(ValidationError::new("triggers[0].metric", "unknown metric")).into();
        match invalid {
            ChainwatchError::Compilation(message) => assert!(message.contains("triggers[0].metric")),
            other => panic!("unexpected error: {other:?}"),
        }

        let empty: ChainwatchError = CompileError::EmptyInput.into();
        assert!(matches!(empty, ChainwatchError::Compilation(_)));
    }
}
