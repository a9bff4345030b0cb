//! Answer generation from retrieved context.

use std::sync::Arc;

use rag_sentinel_core::models::RetrievedContext;
use rag_sentinel_core::prompt::answer_prompt;

use crate::chat::{ChatModel, CompletionOptions};
use crate::config::ChatConfig;
use crate::error::{SentinelError, SentinelResult, Stage};

pub struct Responder {
    model: Arc<dyn ChatModel>,
    options: CompletionOptions,
}

impl Responder {
    pub fn new(model: Arc<dyn ChatModel>, config: &ChatConfig) -> Self {
        Self {
            model,
            options: CompletionOptions {
                model: config.model.clone(),
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
        }
    }

    pub fn build_prompt(&self, context: &RetrievedContext, query: &str) -> String {
        answer_prompt(&context.documents, query)
    }

    /// Call the chat model with the configured model, temperature and
    /// token budget. Failure is a hard failure for the query.
    pub async fn respond(&self, prompt: &str) -> SentinelResult<String> {
        self.model
            .complete(prompt, &self.options)
            .await
            .map_err(|e| SentinelError::external(Stage::Completion, e))
    }
}
