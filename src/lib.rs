//! # rag-sentinel
//!
//! A streaming retrieval-augmented answering service that can watch a
//! question over time and alert when its answer meaningfully changes.
//!
//! Documents stream in from JSONL files and are embedded into an in-memory
//! vector index. Each query is classified for alert intent, answered from
//! the top-k nearest documents, and returned. Answers of alert-enabled
//! queries are deduplicated per query (exact match first, then a
//! language-model judge) and every accepted change is sent to a webhook.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ SourceWatcher │──▶│   Indexer    │──▶│ VectorIndex  │
//! │  JSONL files  │   │ embed batch  │   │  (in memory) │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             │ top-k
//!  POST /v1/query ──▶ intent ─▶ embed ─▶ retrieve ─▶ respond ──▶ {result}
//!                                                       │
//!                                          AnswerWatcher (alert-enabled)
//!                                          dedup ─▶ log ─▶ webhook
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export OPENAI_API_KEY=...
//! export DISCORD_WEBHOOK_URL=...
//! sentinel serve
//! sentinel ask "Tell me and alert about mammals"
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`error`] | Pipeline error taxonomy |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`chat`] | Chat-completion provider abstraction |
//! | [`ingest`] | Source watcher and indexer |
//! | [`intent`] | Alert-intent detection |
//! | [`retriever`] | Top-k context lookup |
//! | [`responder`] | Answer generation |
//! | [`dedup`] | Per-query semantic deduplication |
//! | [`alert`] | Alert sinks |
//! | [`answer_log`] | JSONL answer logs |
//! | [`pipeline`] | Query pipeline and wiring |
//! | [`server`] | HTTP server |
//! | [`db`] | SQLite baseline store |
//! | [`migrate`] | Schema migrations |

pub mod alert;
pub mod answer_log;
pub mod chat;
pub mod config;
pub mod db;
pub mod dedup;
pub mod embedding;
pub mod error;
pub mod http;
pub mod ingest;
pub mod intent;
pub mod logging;
pub mod migrate;
pub mod pipeline;
pub mod responder;
pub mod retriever;
pub mod server;
pub mod stats;
