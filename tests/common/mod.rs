//! Deterministic stand-ins for the embedding model, chat model and alert
//! channel, shared by the integration tests.

#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use rag_sentinel::alert::AlertSink;
use rag_sentinel::chat::{ChatModel, CompletionOptions};
use rag_sentinel::config::Config;
use rag_sentinel::embedding::Embedder;
use rag_sentinel::pipeline::{build_services, Services};
use rag_sentinel_core::embedding::Metric;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Words the bag-of-words embedder knows about; anything else is ignored.
pub const VOCAB: &[&str] = &[
    "cats", "dogs", "mammals", "sun", "star", "windows", "tell", "about", "are", "the", "is", "a",
];

/// One dimension per [`VOCAB`] word, counting occurrences.
pub struct BagOfWords;

#[async_trait]
impl Embedder for BagOfWords {
    fn model_name(&self) -> &str {
        "bag-of-words"
    }

    fn dims(&self) -> usize {
        VOCAB.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0; VOCAB.len()];
    for word in text.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if let Some(i) = VOCAB.iter().position(|w| *w == word) {
            v[i] += 1.0;
        }
    }
    v
}

/// [`BagOfWords`] for its first `full_calls` calls, then vectors truncated
/// to three components, as if the provider switched models underneath.
pub struct NarrowingEmbedder {
    full_calls: usize,
    calls: AtomicUsize,
}

impl NarrowingEmbedder {
    pub fn after(full_calls: usize) -> Self {
        Self {
            full_calls,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Embedder for NarrowingEmbedder {
    fn model_name(&self) -> &str {
        "narrowing"
    }

    fn dims(&self) -> usize {
        VOCAB.len()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = bag_of_words(t);
                if call >= self.full_calls {
                    v.truncate(3);
                }
                v
            })
            .collect())
    }
}

/// Chat model that answers every prompt with `No. slow` after `delay`.
pub struct SlowChat {
    pub delay: Duration,
}

#[async_trait]
impl ChatModel for SlowChat {
    fn model_name(&self) -> &str {
        "slow"
    }

    async fn complete(&self, _prompt: &str, _options: &CompletionOptions) -> Result<String> {
        tokio::time::sleep(self.delay).await;
        Ok("No. slow".to_string())
    }
}

/// Chat model that recognizes the three prompt kinds.
///
/// - intent: `Yes. <query without " and alert">` if the query contains
///   "and alert", else `No. <query>`
/// - answer: the next scripted answer (the last one repeats)
/// - oracle: the next scripted decision, `"No"` when none are left
#[derive(Default)]
pub struct ScriptedChat {
    answers: Mutex<VecDeque<String>>,
    last_answer: Mutex<Option<String>>,
    decisions: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    fail_answers: bool,
}

impl ScriptedChat {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: Mutex::new(answers.iter().map(|s| s.to_string()).collect()),
            ..Default::default()
        }
    }

    pub fn with_decisions(self, decisions: &[&str]) -> Self {
        *self.decisions.lock().unwrap() = decisions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn failing_answers() -> Self {
        Self {
            fail_answers: true,
            ..Default::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn answer_prompts(&self) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.starts_with("Please process the documents below"))
            .collect()
    }

    pub fn oracle_calls(&self) -> usize {
        self.prompts()
            .iter()
            .filter(|p| p.contains("Are the two following responses deviating?"))
            .count()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(query) = extract_between(prompt, "User Query: '", "'\n") {
            return Ok(if query.contains(" and alert") {
                format!("Yes. {}", query.replace(" and alert", ""))
            } else {
                format!("No. {}", query)
            });
        }

        if prompt.contains("Are the two following responses deviating?") {
            let next = self.decisions.lock().unwrap().pop_front();
            return Ok(next.unwrap_or_else(|| "No".to_string()));
        }

        if self.fail_answers {
            bail!("chat completion error 500: upstream unavailable");
        }
        let next = self.answers.lock().unwrap().pop_front();
        let mut last = self.last_answer.lock().unwrap();
        if let Some(next) = next {
            *last = Some(next);
        }
        Ok(last.clone().unwrap_or_else(|| "no answer scripted".to_string()))
    }
}

fn extract_between<'a>(s: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = s.find(start)? + start.len();
    let to = s[from..].find(end)? + from;
    Some(&s[from..to])
}

/// Alert sink that remembers every message.
#[derive(Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<String>>,
    fail: bool,
}

impl RecordingSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, message: &str) -> Result<()> {
        if self.fail {
            bail!("webhook error 404: Unknown Webhook");
        }
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

/// A configuration whose every path lives under `root`.
pub fn test_config(root: &Path) -> Config {
    let mut config = Config::default();
    config.source.path = root.join("events");
    config.embedding.dims = VOCAB.len();
    config.retrieval.k = 2;
    config.retrieval.metric = Metric::Cosine;
    config.alerts.sink = "log".to_string();
    config.dedup.path = root.join("dedup.sqlite");
    config.answer_log.raw_path = root.join("logs/new_responses.jsonl");
    config.answer_log.deduped_path = root.join("logs/deduped_responses.jsonl");
    config.server.request_timeout_secs = 10;
    config
}

pub async fn services(config: &Config, chat: Arc<ScriptedChat>, sink: Arc<RecordingSink>) -> Services {
    build_services(config, Arc::new(BagOfWords), chat, sink)
        .await
        .unwrap()
}

pub async fn services_with(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
) -> Services {
    build_services(config, embedder, chat, Arc::new(RecordingSink::default()))
        .await
        .unwrap()
}

/// Poll `cond` until it holds or a few seconds pass.
pub async fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    cond()
}
