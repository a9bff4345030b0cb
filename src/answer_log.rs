//! Append-only JSONL logs of produced answers.
//!
//! Two logs are kept: every answer (`answer_log.raw_path`) and the answers
//! the dedup reducer accepted (`answer_log.deduped_path`). Each line is
//!
//! ```json
//! {"query_id":"…","query":"…","alert_enabled":true,"response":"…","time":1718000000000}
//! ```
//!
//! Logging is best effort: a failed write is reported at `error` level and
//! never fails the query that produced the answer.

use anyhow::{Context, Result};
use rag_sentinel_core::models::Answer;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::error;

/// One line of an answer log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerLogEntry {
    pub query_id: String,
    pub query: String,
    pub alert_enabled: bool,
    pub response: String,
    /// Unix time in milliseconds.
    pub time: i64,
}

impl AnswerLogEntry {
    pub fn new(answer: &Answer) -> Self {
        Self {
            query_id: answer.query_id.clone(),
            query: answer.query.clone(),
            alert_enabled: answer.alert_enabled,
            response: answer.response.clone(),
            time: chrono::Utc::now().timestamp_millis(),
        }
    }
}

pub struct AnswerLog {
    path: PathBuf,
    // Serializes appends so concurrent writers never interleave lines.
    lock: Mutex<()>,
}

impl AnswerLog {
    /// Open a log at `path`, creating parent directories.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create answer log directory: {}", parent.display())
                })?;
            }
        }
        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, answer: &Answer) -> Result<()> {
        let mut line = serde_json::to_string(&AnswerLogEntry::new(answer))?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open answer log: {}", self.path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// [`append`](Self::append), logging instead of returning failures.
    pub async fn record(&self, answer: &Answer) {
        if let Err(e) = self.append(answer).await {
            error!(
                path = %self.path.display(),
                query_id = %answer.query_id,
                error = %e,
                "failed to write answer log"
            );
        }
    }
}

/// Read every entry of a log. Used by tests and diagnostics.
pub fn read_entries(path: &Path) -> Result<Vec<AnswerLogEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read answer log: {}", path.display()))?;
    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).context("Malformed answer log line"))
        .collect()
}
