//! Document ingestion: source files → embedding → [`DocumentIndex`].
//!
//! Documents arrive as JSON lines (`{"doc": "..."}`) appended to files
//! under `source.path`. The flow is two tasks joined by a channel:
//!
//! ```text
//! SourceWatcher ──mpsc<DocumentRecord>──▶ Indexer ──▶ VectorIndex
//!                        ▲
//!        POST /documents ┘
//! ```
//!
//! The watcher polls, remembers a byte offset per file, and only forwards
//! complete, newly appended lines. The indexer batches records, embeds each
//! batch with one provider call, and inserts every document atomically.
//! Malformed lines and failed embedding batches are logged and dropped;
//! a dimensionality mismatch stops ingestion.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use rag_sentinel_core::models::DocumentRecord;
use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::SourceConfig;
use crate::embedding::Embedder;
use crate::error::{SentinelError, SentinelResult, Stage};
use crate::retriever::DocumentIndex;
use crate::stats::Stats;

const CHANNEL_CAPACITY: usize = 1024;

pub type DocumentSender = mpsc::Sender<DocumentRecord>;
pub type DocumentReceiver = mpsc::Receiver<DocumentRecord>;

/// The channel shared by the watcher, `POST /documents`, and the indexer.
pub fn document_channel() -> (DocumentSender, DocumentReceiver) {
    mpsc::channel(CHANNEL_CAPACITY)
}

// ═══════════════════════════════════════════════════════════════════════
// Source watcher
// ═══════════════════════════════════════════════════════════════════════

pub struct SourceWatcher {
    root: PathBuf,
    include_set: GlobSet,
    poll_interval: Duration,
    offsets: HashMap<PathBuf, u64>,
    stats: Arc<Stats>,
}

impl SourceWatcher {
    pub fn new(config: &SourceConfig, stats: Arc<Stats>) -> Result<Self> {
        Ok(Self {
            root: config.path.clone(),
            include_set: build_globset(&config.include_globs)?,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            offsets: HashMap::new(),
            stats,
        })
    }

    /// Read complete lines appended since the previous poll.
    ///
    /// A trailing line without a newline is left for the next poll.
    pub fn poll(&mut self) -> Result<Vec<DocumentRecord>> {
        self.read_new(false)
    }

    /// Like [`poll`](Self::poll), but also consumes trailing partial lines.
    pub fn drain(&mut self) -> Result<Vec<DocumentRecord>> {
        self.read_new(true)
    }

    /// Poll forever, forwarding records until the receiving side closes.
    ///
    /// Each poll walks and reads the source tree, so it runs on the blocking
    /// pool rather than on the runtime's worker threads.
    pub async fn run(self, tx: DocumentSender) -> Result<()> {
        info!(
            root = %self.root.display(),
            interval_ms = self.poll_interval.as_millis() as u64,
            "watching document source"
        );
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut watcher = self;
        loop {
            ticker.tick().await;
            let (returned, polled) = tokio::task::spawn_blocking(move || {
                let mut watcher = watcher;
                let polled = watcher.poll();
                (watcher, polled)
            })
            .await
            .context("source poll task panicked")?;
            watcher = returned;

            let records = match polled {
                Ok(records) => records,
                Err(e) => {
                    warn!(root = %watcher.root.display(), error = %e, "source poll failed");
                    continue;
                }
            };
            for record in records {
                if tx.send(record).await.is_err() {
                    debug!("document channel closed; stopping watcher");
                    return Ok(());
                }
            }
        }
    }

    fn read_new(&mut self, include_partial: bool) -> Result<Vec<DocumentRecord>> {
        if !self.root.exists() {
            debug!(root = %self.root.display(), "source directory does not exist yet");
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&self.root).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            if self.include_set.is_match(relative) {
                files.push(path.to_path_buf());
            }
        }
        // Sort for deterministic ordering
        files.sort();

        let mut records = Vec::new();
        for path in files {
            let offset = self.offsets.get(&path).copied().unwrap_or(0);
            let (consumed, lines) = read_appended(&path, offset, include_partial)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            self.offsets.insert(path.clone(), consumed);

            for (line_no, line) in lines {
                match parse_record(&line) {
                    Some(Ok(record)) => records.push(record),
                    Some(Err(e)) => {
                        self.stats.record_rejected();
                        warn!(
                            file = %path.display(),
                            line = line_no,
                            error = %e,
                            "skipping malformed document record"
                        );
                    }
                    None => {}
                }
            }
        }
        Ok(records)
    }
}

/// Read lines starting at byte `offset`. Returns the new offset and the
/// lines read, each tagged with a 1-based position within this read.
///
/// A file shorter than `offset` was truncated or replaced and is re-read
/// from the start.
fn read_appended(path: &Path, offset: u64, include_partial: bool) -> Result<(u64, Vec<(usize, String)>)> {
    let mut file = std::fs::File::open(path)?;
    let len = file.metadata()?.len();
    let start = if len < offset { 0 } else { offset };
    if len == start {
        return Ok((start, Vec::new()));
    }

    file.seek(SeekFrom::Start(start))?;
    let mut buf = Vec::with_capacity((len - start) as usize);
    file.read_to_end(&mut buf)?;

    let complete = if include_partial {
        buf.len()
    } else {
        match buf.iter().rposition(|&b| b == b'\n') {
            Some(pos) => pos + 1,
            None => 0,
        }
    };

    let text = String::from_utf8_lossy(&buf[..complete]);
    let lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.to_string()))
        .collect();
    Ok((start + complete as u64, lines))
}

/// `None` for blank lines.
fn parse_record(line: &str) -> Option<serde_json::Result<DocumentRecord>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Read every record currently present under `source.path`.
pub fn scan_once(config: &SourceConfig, stats: Arc<Stats>) -> Result<Vec<DocumentRecord>> {
    SourceWatcher::new(config, stats)?.drain()
}

// ═══════════════════════════════════════════════════════════════════════
// Indexer
// ═══════════════════════════════════════════════════════════════════════

pub struct Indexer {
    embedder: Arc<dyn Embedder>,
    index: Arc<DocumentIndex>,
    batch_size: usize,
    stats: Arc<Stats>,
}

impl Indexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<DocumentIndex>,
        batch_size: usize,
        stats: Arc<Stats>,
    ) -> Self {
        Self {
            embedder,
            index,
            batch_size: batch_size.max(1),
            stats,
        }
    }

    /// Embed and insert `records`, `batch_size` at a time. Returns the number
    /// of documents inserted.
    ///
    /// An embedding failure aborts with [`SentinelError::ExternalCall`];
    /// documents from earlier batches stay indexed.
    pub async fn index_records(&self, records: &[DocumentRecord]) -> SentinelResult<usize> {
        let mut inserted = 0;
        for batch in records.chunks(self.batch_size) {
            inserted += self.index_batch(batch).await?;
        }
        Ok(inserted)
    }

    async fn index_batch(&self, batch: &[DocumentRecord]) -> SentinelResult<usize> {
        let texts: Vec<String> = batch.iter().map(|r| r.doc.clone()).collect();
        let vectors = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| SentinelError::external(Stage::Embedding, e))?;

        for (text, vector) in texts.into_iter().zip(vectors) {
            self.index
                .insert(Uuid::new_v4().to_string(), vector, text)?;
            self.stats.document_indexed();
        }
        debug!(documents = batch.len(), indexed = self.index.len(), "indexed batch");
        Ok(batch.len())
    }

    /// Drain `rx` until every sender is dropped.
    ///
    /// Returns an error only for a dimensionality mismatch, which means the
    /// embedding model and `embedding.dims` disagree.
    pub async fn run(self, mut rx: DocumentReceiver) -> SentinelResult<()> {
        let mut batch = Vec::with_capacity(self.batch_size);
        while let Some(first) = rx.recv().await {
            batch.push(first);
            while batch.len() < self.batch_size {
                match rx.try_recv() {
                    Ok(record) => batch.push(record),
                    Err(_) => break,
                }
            }

            match self.index_batch(&batch).await {
                Ok(_) => {}
                Err(e @ SentinelError::Configuration(_)) => {
                    error!(error = %e, "embedding dimensionality does not match the index");
                    return Err(e);
                }
                Err(e) => {
                    error!(documents = batch.len(), error = %e, "dropping document batch");
                }
            }
            batch.clear();
        }
        debug!("document channel closed; indexer stopping");
        Ok(())
    }
}
