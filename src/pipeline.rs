//! Per-query answering and background alerting.
//!
//! ```text
//! raw query ─▶ intent ─▶ query id ─▶ embed ─▶ retrieve ─▶ respond ─▶ Answer
//!                                                                    │
//!                           (alert_enabled) AnswerWatcher ◀──────────┘
//!                           reducer ─▶ deduped log ─▶ AlertSink
//! ```
//!
//! Each stage is a suspendable call scoped to one query, so unrelated
//! queries never wait on each other. The request deadline
//! (`server.request_timeout_secs`) bounds the whole chain and a stage that
//! runs past it fails with [`SentinelError::Timeout`] naming that stage.

use anyhow::Result;
use rag_sentinel_core::identity::query_id;
use rag_sentinel_core::models::{Answer, Query};
use rag_sentinel_core::prompt::{format_result, notification_message};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::alert::{create_sink, AlertSink};
use crate::answer_log::AnswerLog;
use crate::chat::ChatModel;
use crate::config::Config;
use crate::dedup::{create_baseline_store, Acceptor, BaselineStore, Decision, DedupReducer, OracleAcceptor};
use crate::embedding::Embedder;
use crate::error::{SentinelError, SentinelResult, Stage};
use crate::intent::IntentExtractor;
use crate::responder::Responder;
use crate::retriever::{DocumentIndex, Retriever};
use crate::stats::Stats;

// ═══════════════════════════════════════════════════════════════════════
// Answer watcher
// ═══════════════════════════════════════════════════════════════════════

/// Deduplicates answers of alert-enabled queries and notifies on the ones
/// that are accepted.
pub struct AnswerWatcher {
    reducer: DedupReducer<Arc<dyn BaselineStore>, Arc<dyn Acceptor>>,
    deduped_log: Option<AnswerLog>,
    sink: Arc<dyn AlertSink>,
    stats: Arc<Stats>,
}

impl AnswerWatcher {
    pub fn new(
        store: Arc<dyn BaselineStore>,
        acceptor: Arc<dyn Acceptor>,
        sink: Arc<dyn AlertSink>,
        deduped_log: Option<AnswerLog>,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            reducer: DedupReducer::new(store, acceptor),
            deduped_log,
            sink,
            stats,
        }
    }

    /// Offer `answer` to the reducer; log and deliver it if accepted.
    ///
    /// Answers without alerting are ignored and yield `None`. Delivery
    /// failures are logged and counted, never returned. The only error is a
    /// failing baseline store.
    pub async fn observe(&self, answer: &Answer) -> Result<Option<Decision>> {
        if !answer.alert_enabled {
            return Ok(None);
        }

        let decision = self.reducer.offer(&answer.query_id, &answer.response).await?;
        if !decision.is_accepted() {
            self.stats.answer_suppressed();
            debug!(query_id = %answer.query_id, ?decision, "answer suppressed");
            return Ok(Some(decision));
        }

        self.stats.answer_accepted();
        if let Some(log) = &self.deduped_log {
            log.record(answer).await;
        }

        let message = notification_message(&answer.query, &answer.response);
        match self.sink.send(&message).await {
            Ok(()) => {
                self.stats.alert_delivered();
                info!(query_id = %answer.query_id, sink = self.sink.name(), ?decision, "alert delivered");
            }
            Err(e) => {
                self.stats.delivery_failed();
                let err = SentinelError::Delivery(e);
                error!(query_id = %answer.query_id, sink = self.sink.name(), error = %err, "alert not delivered");
            }
        }
        Ok(Some(decision))
    }

    /// [`observe`](Self::observe) on a background task.
    pub fn spawn_observe(self: &Arc<Self>, answer: Answer) {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = watcher.observe(&answer).await {
                error!(query_id = %answer.query_id, error = %e, "dedup baseline store failed");
            }
        });
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Query pipeline
// ═══════════════════════════════════════════════════════════════════════

pub struct QueryPipeline {
    intent: IntentExtractor,
    embedder: Arc<dyn Embedder>,
    retriever: Retriever,
    responder: Responder,
    raw_log: Option<AnswerLog>,
    watcher: Arc<AnswerWatcher>,
    stats: Arc<Stats>,
    request_timeout: Option<Duration>,
    fatal: watch::Sender<Option<String>>,
}

impl QueryPipeline {
    pub fn new(
        config: &Config,
        chat: Arc<dyn ChatModel>,
        embedder: Arc<dyn Embedder>,
        index: Arc<DocumentIndex>,
        watcher: Arc<AnswerWatcher>,
        stats: Arc<Stats>,
    ) -> Result<Self> {
        let raw_log = if config.answer_log.enabled {
            Some(AnswerLog::open(&config.answer_log.raw_path)?)
        } else {
            None
        };
        let request_timeout = match config.server.request_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            intent: IntentExtractor::new(chat.clone(), &config.chat),
            embedder,
            retriever: Retriever::new(index, config.retrieval.k),
            responder: Responder::new(chat, &config.chat),
            raw_log,
            watcher,
            stats,
            request_timeout,
            fatal: watch::channel(None).0,
        })
    }

    pub fn watcher(&self) -> &Arc<AnswerWatcher> {
        &self.watcher
    }

    pub fn stats(&self) -> &Arc<Stats> {
        &self.stats
    }

    /// Receives the message of the first configuration error hit while
    /// answering. A running service must stop once it is set.
    pub fn fatal_errors(&self) -> watch::Receiver<Option<String>> {
        self.fatal.subscribe()
    }

    /// Answer one query and record it in the raw answer log.
    pub async fn answer(&self, user: &str, raw_query: &str) -> SentinelResult<Answer> {
        let result = self.run_stages(user, raw_query).await;
        match &result {
            Ok(answer) => {
                self.stats.query_answered();
                if let Some(log) = &self.raw_log {
                    log.record(answer).await;
                }
            }
            Err(e @ SentinelError::Configuration(_)) => {
                self.stats.query_failed();
                error!(user, error = %e, "configuration error while answering");
                self.fatal.send_if_modified(|slot| {
                    if slot.is_some() {
                        return false;
                    }
                    *slot = Some(e.to_string());
                    true
                });
            }
            Err(e) => {
                self.stats.query_failed();
                warn!(user, error = %e, "query failed");
            }
        }
        result
    }

    /// Answer one query and return the user-facing result string. For
    /// alert-enabled queries, alerting continues in the background after
    /// this returns.
    pub async fn handle(&self, user: &str, raw_query: &str) -> SentinelResult<String> {
        let answer = self.answer(user, raw_query).await?;
        let result = format_result(&answer.response, answer.alert_enabled);
        if answer.alert_enabled {
            self.watcher.spawn_observe(answer);
        }
        Ok(result)
    }

    async fn run_stages(&self, user: &str, raw_query: &str) -> SentinelResult<Answer> {
        if raw_query.trim().is_empty() {
            return Err(SentinelError::BadRequest("query must not be empty".to_string()));
        }
        let deadline = self.request_timeout.map(|t| Instant::now() + t);

        let intent = within(deadline, Stage::Intent, self.intent.extract(raw_query)).await?;
        let id = query_id(user, &intent.clean_query);

        let embedding = within(deadline, Stage::Embedding, async {
            self.embedder
                .embed(&intent.clean_query)
                .await
                .map_err(|e| SentinelError::external(Stage::Embedding, e))
        })
        .await?;

        let query = Query {
            user: user.to_string(),
            raw_query: raw_query.to_string(),
            clean_query: intent.clean_query,
            alert_enabled: intent.alert_enabled,
            embedding,
            query_id: id,
        };

        let context = self.retriever.retrieve(&query)?;
        let prompt = self.responder.build_prompt(&context, &query.clean_query);
        let response = within(deadline, Stage::Completion, self.responder.respond(&prompt)).await?;

        debug!(
            query_id = %query.query_id,
            alert_enabled = query.alert_enabled,
            documents = context.documents.len(),
            "answered query"
        );

        Ok(Answer {
            query_id: query.query_id,
            query: query.clean_query,
            alert_enabled: query.alert_enabled,
            response,
        })
    }
}

async fn within<T, F>(deadline: Option<Instant>, stage: Stage, fut: F) -> SentinelResult<T>
where
    F: Future<Output = SentinelResult<T>>,
{
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .map_err(|_| SentinelError::Timeout { stage })?,
        None => fut.await,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Assembly
// ═══════════════════════════════════════════════════════════════════════

/// Everything a running service shares.
pub struct Services {
    pub index: Arc<DocumentIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub pipeline: Arc<QueryPipeline>,
    pub stats: Arc<Stats>,
}

/// Embed a sample text and check the vector width against
/// `embedding.dims`.
///
/// A provider that cannot be reached is only logged: the width is then
/// checked again on the first indexed batch or query.
pub async fn verify_embedding_dims(embedder: &dyn Embedder, dims: usize) -> SentinelResult<()> {
    match embedder.embed("dimension check").await {
        Ok(vector) if vector.len() != dims => Err(SentinelError::Configuration(format!(
            "embedding model '{}' returns {}-dimensional vectors but embedding.dims is {}",
            embedder.model_name(),
            vector.len(),
            dims
        ))),
        Ok(_) => Ok(()),
        Err(e) => {
            warn!(model = embedder.model_name(), error = %e, "could not verify embedding dimensions at startup");
            Ok(())
        }
    }
}

/// Wire the pipeline from configuration and the given providers.
///
/// Fails with [`SentinelError::Configuration`] if the embedder's vectors do
/// not have `embedding.dims` components.
pub async fn build_services(
    config: &Config,
    embedder: Arc<dyn Embedder>,
    chat: Arc<dyn ChatModel>,
    sink: Arc<dyn AlertSink>,
) -> Result<Services> {
    verify_embedding_dims(embedder.as_ref(), config.embedding.dims).await?;

    let stats = Arc::new(Stats::new());
    let index = Arc::new(DocumentIndex::new(
        config.embedding.dims,
        config.retrieval.metric,
    ));

    let store = create_baseline_store(&config.dedup).await?;
    let acceptor: Arc<dyn Acceptor> = Arc::new(OracleAcceptor::new(chat.clone(), &config.chat));
    let deduped_log = if config.answer_log.enabled {
        Some(AnswerLog::open(&config.answer_log.deduped_path)?)
    } else {
        None
    };
    let watcher = Arc::new(AnswerWatcher::new(store, acceptor, sink, deduped_log, stats.clone()));

    let pipeline = QueryPipeline::new(
        config,
        chat,
        embedder.clone(),
        index.clone(),
        watcher,
        stats.clone(),
    )?;

    Ok(Services {
        index,
        embedder,
        pipeline: Arc::new(pipeline),
        stats,
    })
}

/// [`build_services`] with the providers and sink named in the config.
pub async fn build_services_from_config(config: &Config) -> Result<Services> {
    let embedder = crate::embedding::create_embedder(&config.embedding)?;
    let chat = crate::chat::create_chat_model(&config.chat)?;
    let sink = create_sink(&config.alerts)?;
    build_services(config, embedder, chat, sink).await
}
