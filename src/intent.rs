//! Alert-intent detection.
//!
//! One chat call per query asks the model whether the user wants to be
//! notified when the answer changes, and to restate the question without
//! the alerting phrase. Parsing lives in
//! [`prompt::parse_intent_reply`](rag_sentinel_core::prompt::parse_intent_reply);
//! an unparseable reply degrades to "no alerting" instead of failing.

use std::sync::Arc;

use rag_sentinel_core::prompt::{intent_prompt, parse_intent_reply, IntentReply};
use tracing::warn;

use crate::chat::{ChatModel, CompletionOptions};
use crate::config::ChatConfig;
use crate::error::{SentinelError, SentinelResult, Stage};

pub struct IntentExtractor {
    model: Arc<dyn ChatModel>,
    options: CompletionOptions,
}

impl IntentExtractor {
    pub fn new(model: Arc<dyn ChatModel>, config: &ChatConfig) -> Self {
        Self {
            model,
            options: CompletionOptions {
                model: config.model.clone(),
                temperature: config.intent_temperature,
                max_tokens: config.intent_max_tokens,
            },
        }
    }

    /// Classify `raw_query` into `(alert_enabled, clean_query)`.
    ///
    /// Fails only when the model call itself fails.
    pub async fn extract(&self, raw_query: &str) -> SentinelResult<IntentReply> {
        let reply = self
            .model
            .complete(&intent_prompt(raw_query), &self.options)
            .await
            .map_err(|e| SentinelError::external(Stage::Intent, e))?;

        let parsed = parse_intent_reply(&reply, raw_query);
        if !parsed.recognized {
            warn!(
                reply = %reply,
                "intent reply did not start with Yes/No; alerting disabled for this query"
            );
        }
        Ok(parsed)
    }
}
