//! Text-generation oracle abstraction

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::error::OracleError;

/// A `prompt -> text` function backed by some language model
#[async_trait]
pub trait TextOracle: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError>;
}

/// Canned responses, served in order; the last one repeats.
///
/// Used for dry runs and tests. Every prompt it receives is kept so callers
/// can inspect what would have been sent.
#[derive(Debug, Default)]
pub struct StaticOracle {
    responses: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl StaticOracle {
    pub fn new(response: impl Into<String>) -> Self {
        Self::sequence(vec![response.into()])
    }

    pub fn sequence(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().map(Ok).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Oracle that always fails as unavailable
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from([Err(reason.into())])),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl TextOracle for StaticOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().push(prompt.to_string());

        let mut responses = self.responses.lock();
        let next = if responses.len() > 1 {
            responses.pop_front()
        } else {
            responses.front().cloned()
        };

        match next {
            Some(Ok(text)) => Ok(text),
            Some(Err(reason)) => Err(OracleError::Transport(reason)),
            None => Err(OracleError::EmptyResponse),
        }
    }
}
