//! Language model abstraction
//!
//! Provides a unified interface over the text-generation provider:
//! - Anthropic messages API (single response and server-sent-event streaming)
//! - Deterministic mock for development and tests
//! - Bounded exponential-backoff retry for the non-streaming path

mod client;
mod mock;
mod retry;
pub mod sse;

pub use client::AnthropicClient;
pub use mock::MockLanguageModel;
pub use retry::{complete_with_retry, RetryPolicy};

use crate::config::LlmConfig;
use crate::errors::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Incremental text chunks from a streaming completion
pub type TokenStream = BoxStream<'static, Result<String>>;

/// A single chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Provider-neutral completion request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

impl CompletionRequest {
    /// Single-turn request with default sampling
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            max_tokens: 2048,
            temperature: 0.7,
            system: None,
            messages: vec![Message::user(prompt)],
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Trait for text generation
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Generate the full completion in one response
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// Open a token stream; dropping the stream aborts the upstream call
    async fn stream(&self, request: &CompletionRequest) -> Result<TokenStream>;

    /// Provider name used in logs and metrics
    fn name(&self) -> &str;
}

/// Create a language model based on configuration
///
/// Without an API key the deterministic mock is used so the service stays
/// usable in development.
pub fn create_language_model(config: &LlmConfig) -> Result<Arc<dyn LanguageModel>> {
    match config.api_key() {
        Some(key) => Ok(Arc::new(AnthropicClient::new(config, key.to_string())?)),
        None => {
            tracing::warn!("No LLM API key configured, using mock language model");
            Ok(Arc::new(MockLanguageModel::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = CompletionRequest::new("model-a", "Explain tides")
            .with_max_tokens(4096)
            .with_temperature(0.3)
            .with_system("Be brief");

        assert_eq!(request.max_tokens, 4096);
        assert_eq!(request.temperature, 0.3);
        assert_eq!(request.system.as_deref(), Some("Be brief"));
        assert_eq!(request.messages, vec![Message::user("Explain tides")]);
    }

    #[test]
    fn test_factory_falls_back_to_mock() {
        let config = LlmConfig {
            api_key: Some("   ".to_string()),
            ..Default::default()
        };
        let model = create_language_model(&config).unwrap();
        assert_eq!(model.name(), "mock");
    }
}
