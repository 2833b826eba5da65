//! OpenRouter chat-completions oracle

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use std::time::Duration;
use tracing::{debug, error};

use crate::error::OracleError;
use crate::oracle::TextOracle;

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_MODEL: &str = "anthropic/claude-3.5-sonnet";

#[derive(Debug, Clone)]
pub struct OpenRouterConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_key: Secret::new(String::new()),
            base_url: OPENROUTER_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            // Low temperature keeps the JSON shape stable between calls
            temperature: 0.1,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Clone)]
pub struct OpenRouterOracle {
    client: Client,
    config: OpenRouterConfig,
}

impl OpenRouterOracle {
    pub fn new(config: OpenRouterConfig) -> Result<Self, OracleError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(OracleError::Configuration(
                "OpenRouter API key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OracleError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self, OracleError> {
        let api_key = env::var("OPENROUTER_API_KEY")
            .map_err(|_| OracleError::Configuration("OPENROUTER_API_KEY not set".to_string()))?;

        // Optional model override
        let model = env::var("OPENROUTER_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Self::new(OpenRouterConfig {
            api_key: Secret::new(api_key),
            model,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &OpenRouterConfig {
        &self.config
    }

    pub async fn chat_completion(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<ChatCompletionResponse, OracleError> {
        let payload = json!({
            "model": self.config.model,
            "messages": messages,
            "temperature": self.config.temperature,
            "stream": false
        });

        debug!("Sending OpenRouter request (model: {})", self.config.model);

        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(url)
            .bearer_auth(self.config.api_key.expose_secret())
            .header("X-Title", "Chainwatch")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    OracleError::Timeout(Duration::from_secs(self.config.timeout_secs))
                } else {
                    OracleError::from(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("OpenRouter API error ({}): {}", status, body);
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl TextOracle for OpenRouterOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        let response = self
            .chat_completion(vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }])
            .await?;

        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(OracleError::EmptyResponse)
    }
}
