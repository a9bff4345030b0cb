//! Chat-completion provider abstraction and implementations.
//!
//! The pipeline talks to the chat model for three purposes (intent
//! detection, answering, and the deviation oracle), each with its own
//! [`CompletionOptions`]. Providers:
//! - **[`OpenAIChat`]**: `POST /v1/chat/completions`.
//! - **[`OllamaChat`]**: `POST /api/chat` with streaming disabled.
//!
//! Completion calls are not retried: a failed call fails the query that
//! made it. The HTTP client timeout (`chat.timeout_secs`) bounds each call.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ChatConfig;
use crate::http::send_with_retry;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const OLLAMA_BASE_URL: &str = "http://localhost:11434";

/// Per-call sampling options.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A prompt → text model.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the default model identifier (e.g. `"gpt-3.5-turbo"`).
    fn model_name(&self) -> &str;

    /// Send `prompt` as a single user message and return the reply text.
    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

// ============ OpenAI Provider ============

/// Chat provider using the OpenAI API.
///
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIChat {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": options.model,
            "messages": [ChatMessage::user(prompt)],
            "temperature": options.temperature,
            "max_tokens": options.max_tokens,
        });

        let response = send_with_retry("OpenAI chat", 0, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        let json: serde_json::Value = response.json().await.context("OpenAI chat json")?;
        parse_openai_reply(&json)
    }
}

/// Extract `choices[0].message.content`.
fn parse_openai_reply(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI chat response: missing choices[0].message.content"))
}

// ============ Ollama Provider ============

/// Chat provider using a local Ollama instance.
pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl OllamaChat {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OLLAMA_BASE_URL.to_string()),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": options.model,
            "messages": [ChatMessage::user(prompt)],
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "num_predict": options.max_tokens,
            },
        });

        let response = send_with_retry("Ollama chat", 0, || self.client.post(&url).json(&body))
            .await
            .with_context(|| format!("is Ollama running at {}?", self.url))?;

        let json: serde_json::Value = response.json().await.context("Ollama chat json")?;
        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama chat response: missing message.content"))
    }
}

/// Create the [`ChatModel`] named by `chat.provider`.
pub fn create_chat_model(config: &ChatConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        other => bail!("Unknown chat provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_openai_reply() {
        let body = json!({
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "Yes." } }
            ]
        });
        assert_eq!(parse_openai_reply(&body).unwrap(), "Yes.");
    }

    #[test]
    fn test_parse_openai_reply_empty_choices() {
        assert!(parse_openai_reply(&json!({ "choices": [] })).is_err());
    }

    #[test]
    fn test_create_ollama() {
        let config = ChatConfig {
            provider: "ollama".to_string(),
            model: "llama3".to_string(),
            ..Default::default()
        };
        assert_eq!(create_chat_model(&config).unwrap().model_name(), "llama3");
    }

    #[test]
    fn test_create_unknown() {
        let config = ChatConfig {
            provider: "nope".to_string(),
            ..Default::default()
        };
        assert!(create_chat_model(&config).is_err());
    }
}
