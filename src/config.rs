//! TOML configuration parsing and validation.
//!
//! Every key has a default except the alert webhook URL, which is required
//! when the webhook sink is selected. A handful of environment variables
//! override file values after parsing (see [`apply_env_overrides`]), and
//! [`Config::validate`] rejects anything that would make the service start
//! in a broken state.
//!
//! ```toml
//! [source]
//! path = "./data/events/"
//!
//! [server]
//! bind = "0.0.0.0:8080"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-ada-002"
//! dims = 1536
//!
//! [chat]
//! model = "gpt-3.5-turbo"
//! max_tokens = 400
//! temperature = 0.0
//!
//! [retrieval]
//! k = 3
//!
//! [alerts]
//! webhook_url = "https://discord.com/api/webhooks/..."
//! ```

use anyhow::{bail, Context, Result};
use rag_sentinel_core::embedding::Metric;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub dedup: DedupConfig,
    #[serde(default)]
    pub answer_log: AnswerLogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_source_path")]
    pub path: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: default_source_path(),
            include_globs: default_include_globs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_source_path() -> PathBuf {
    PathBuf::from("./data/events/")
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.jsonl".to_string()]
}
fn default_poll_interval_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_request_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_embedding_model(),
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_dims() -> usize {
    1536
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_chat_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_intent_temperature")]
    pub intent_temperature: f32,
    #[serde(default = "default_intent_max_tokens")]
    pub intent_max_tokens: u32,
    #[serde(default = "default_oracle_max_tokens")]
    pub oracle_max_tokens: u32,
    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_chat_model(),
            url: None,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            intent_temperature: default_intent_temperature(),
            intent_max_tokens: default_intent_max_tokens(),
            oracle_max_tokens: default_oracle_max_tokens(),
            timeout_secs: default_chat_timeout_secs(),
        }
    }
}

fn default_chat_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_max_tokens() -> u32 {
    400
}
fn default_intent_temperature() -> f32 {
    0.3
}
fn default_intent_max_tokens() -> u32 {
    100
}
fn default_oracle_max_tokens() -> u32 {
    20
}
fn default_chat_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub metric: Metric,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            metric: Metric::default(),
        }
    }
}

fn default_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertConfig {
    /// `"webhook"` or `"log"`.
    #[serde(default = "default_sink")]
    pub sink: String,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default = "default_alert_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            sink: default_sink(),
            webhook_url: None,
            max_retries: 0,
            timeout_secs: default_alert_timeout_secs(),
        }
    }
}

fn default_sink() -> String {
    "webhook".to_string()
}
fn default_alert_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct DedupConfig {
    /// `"memory"` or `"sqlite"`.
    #[serde(default = "default_store")]
    pub store: String,
    #[serde(default = "default_dedup_path")]
    pub path: PathBuf,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            path: default_dedup_path(),
        }
    }
}

fn default_store() -> String {
    "memory".to_string()
}
fn default_dedup_path() -> PathBuf {
    PathBuf::from("./data/dedup.sqlite")
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_raw_path")]
    pub raw_path: PathBuf,
    #[serde(default = "default_deduped_path")]
    pub deduped_path: PathBuf,
}

impl Default for AnswerLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            raw_path: default_raw_path(),
            deduped_path: default_deduped_path(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_raw_path() -> PathBuf {
    PathBuf::from("./data/new_responses.jsonl")
}
fn default_deduped_path() -> PathBuf {
    PathBuf::from("./data/deduped_responses.jsonl")
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `"pretty"`, `"compact"`, or `"json"`.
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_format() -> String {
    "compact".to_string()
}

impl AlertConfig {
    pub fn webhook_url(&self) -> Option<&str> {
        self.webhook_url.as_deref().filter(|u| !u.trim().is_empty())
    }
}

impl Config {
    /// Reject configurations the service must not start with.
    pub fn validate(&self) -> Result<()> {
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
        if self.embedding.model.trim().is_empty() {
            bail!("embedding.model must not be empty");
        }
        check_provider("embedding", &self.embedding.provider)?;

        if self.chat.model.trim().is_empty() {
            bail!("chat.model must not be empty");
        }
        if self.chat.max_tokens == 0 {
            bail!("chat.max_tokens must be > 0");
        }
        for (name, t) in [
            ("chat.temperature", self.chat.temperature),
            ("chat.intent_temperature", self.chat.intent_temperature),
        ] {
            if !(0.0..=2.0).contains(&t) {
                bail!("{} must be in [0.0, 2.0]", name);
            }
        }
        check_provider("chat", &self.chat.provider)?;

        if self.retrieval.k < 1 {
            bail!("retrieval.k must be >= 1");
        }

        match self.alerts.sink.as_str() {
            "webhook" => {
                if self.alerts.webhook_url().is_none() {
                    bail!(
                        "alerts.webhook_url must be set when alerts.sink is 'webhook' \
                         (or set DISCORD_WEBHOOK_URL)"
                    );
                }
            }
            "log" => {}
            other => bail!("Unknown alert sink: '{}'. Must be webhook or log.", other),
        }

        match self.dedup.store.as_str() {
            "memory" | "sqlite" => {}
            other => bail!("Unknown dedup store: '{}'. Must be memory or sqlite.", other),
        }

        match self.logging.format.as_str() {
            "pretty" | "compact" | "json" => {}
            other => bail!(
                "Unknown logging format: '{}'. Must be pretty, compact, or json.",
                other
            ),
        }

        Ok(())
    }
}

fn check_provider(section: &str, provider: &str) -> Result<()> {
    match provider {
        "openai" | "ollama" => Ok(()),
        other => bail!(
            "Unknown {} provider: '{}'. Must be openai or ollama.",
            section,
            other
        ),
    }
}

/// Parse a configuration from TOML text, apply environment overrides, and
/// validate it.
pub fn parse_config(content: &str) -> Result<Config> {
    let mut config: Config =
        toml::from_str(content).with_context(|| "Failed to parse config file")?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Environment variables that override file values.
///
/// | Variable | Key |
/// |----------|-----|
/// | `SENTINEL_DATA_DIR` | `source.path` |
/// | `SENTINEL_BIND` | `server.bind` |
/// | `SENTINEL_EMBEDDING_MODEL` | `embedding.model` |
/// | `SENTINEL_CHAT_MODEL` | `chat.model` |
/// | `DISCORD_WEBHOOK_URL` | `alerts.webhook_url` |
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = get("SENTINEL_DATA_DIR") {
        config.source.path = PathBuf::from(v);
    }
    if let Some(v) = get("SENTINEL_BIND") {
        config.server.bind = v;
    }
    if let Some(v) = get("SENTINEL_EMBEDDING_MODEL") {
        config.embedding.model = v;
    }
    if let Some(v) = get("SENTINEL_CHAT_MODEL") {
        config.chat.model = v;
    }
    if let Some(v) = get("DISCORD_WEBHOOK_URL") {
        config.alerts.webhook_url = Some(v);
    }
}
