//! Model backend seam.
//!
//! The gateway treats text generation as an opaque call: prompt in, text
//! out. The OpenRouter-style implementation is used in deployments; the echo
//! backend keeps development and demos working without credentials.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AegisError, AegisResult};

/// Opaque text-generation capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a reply for a prompt that already passed input screening.
    async fn generate(&self, prompt: &str) -> AegisResult<String>;
}

/// Backend configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// API key for the completion endpoint.
    pub api_key: String,
    /// Model to use.
    pub model: String,
    /// Endpoint base URL.
    pub base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "meta-llama/llama-3.1-8b-instruct".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Backend over an OpenRouter-compatible chat-completions API.
pub struct OpenRouterBackend {
    config: BackendConfig,
    client: Client,
}

impl OpenRouterBackend {
    pub fn new(config: BackendConfig) -> AegisResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AegisError::Backend(e.to_string()))?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextGenerator for OpenRouterBackend {
    async fn generate(&self, prompt: &str) -> AegisResult<String> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| AegisError::Backend(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AegisError::Backend(format!("API error {}: {}", status, body)));
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| AegisError::Backend(format!("unparseable response: {}", e)))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AegisError::Backend("response has no choices".to_string()))
    }
}

/// Deterministic no-credentials backend: replies with a canned
/// acknowledgement of the prompt.
pub struct EchoBackend;

#[async_trait]
impl TextGenerator for EchoBackend {
    async fn generate(&self, prompt: &str) -> AegisResult<String> {
        Ok(format!("[echo] {}", prompt))
    }
}
