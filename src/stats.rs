//! Process-wide counters.
//!
//! Swallowed failures (malformed records, oracle errors, delivery errors)
//! are counted here so they stay observable after the log line scrolls
//! away. Reported by `GET /health` and by `sentinel ask`.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Stats {
    documents_indexed: AtomicU64,
    records_rejected: AtomicU64,
    queries_answered: AtomicU64,
    queries_failed: AtomicU64,
    answers_accepted: AtomicU64,
    answers_suppressed: AtomicU64,
    alerts_delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub documents_indexed: u64,
    pub records_rejected: u64,
    pub queries_answered: u64,
    pub queries_failed: u64,
    pub answers_accepted: u64,
    pub answers_suppressed: u64,
    pub alerts_delivered: u64,
    pub delivery_failures: u64,
}

macro_rules! counter {
    ($inc:ident, $field:ident) => {
        pub fn $inc(&self) {
            self.$field.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    counter!(document_indexed, documents_indexed);
    counter!(record_rejected, records_rejected);
    counter!(query_answered, queries_answered);
    counter!(query_failed, queries_failed);
    counter!(answer_accepted, answers_accepted);
    counter!(answer_suppressed, answers_suppressed);
    counter!(alert_delivered, alerts_delivered);
    counter!(delivery_failed, delivery_failures);

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            documents_indexed: self.documents_indexed.load(Ordering::Relaxed),
            records_rejected: self.records_rejected.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            queries_failed: self.queries_failed.load(Ordering::Relaxed),
            answers_accepted: self.answers_accepted.load(Ordering::Relaxed),
            answers_suppressed: self.answers_suppressed.load(Ordering::Relaxed),
            alerts_delivered: self.alerts_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
