//! Semantic deduplication of answers, keyed by query id.
//!
//! [`DedupReducer`] is a "last accepted value wins" reducer with a custom
//! notion of equality. Per key it is in one of two states:
//!
//! ```text
//!   NoBaseline ──(any value: accept)──▶ HasBaseline(v)
//!   HasBaseline(old) ──(new == old: suppress)──▶ HasBaseline(old)
//!   HasBaseline(old) ──(acceptor(new, old) = false: suppress)──▶ HasBaseline(old)
//!   HasBaseline(old) ──(acceptor(new, old) = true: accept)──▶ HasBaseline(new)
//! ```
//!
//! The acceptor is only consulted when byte equality fails, so expensive
//! judges (a language model) are called for genuine candidates only.
//!
//! Offers for the same key are serialized by a per-key async mutex; offers
//! for different keys run in parallel. Baselines live in a pluggable
//! [`BaselineStore`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use rag_sentinel_core::prompt::{compare_prompt, is_affirmative};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::warn;

use crate::chat::{ChatModel, CompletionOptions};
use crate::config::{ChatConfig, DedupConfig};
use crate::db::SqliteBaselineStore;
use crate::error::{SentinelError, Stage};

// ═══════════════════════════════════════════════════════════════════════
// Baseline storage
// ═══════════════════════════════════════════════════════════════════════

/// Storage for the last accepted value per key.
///
/// Entries are only ever written by [`DedupReducer`] and never deleted.
#[async_trait]
pub trait BaselineStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Process-lifetime baseline store.
#[derive(Default)]
pub struct InMemoryBaselineStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryBaselineStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BaselineStore for InMemoryBaselineStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl<S: BaselineStore + ?Sized> BaselineStore for Arc<S> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key).await
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        (**self).put(key, value).await
    }
}

/// Open the store named by `dedup.store`.
pub async fn create_baseline_store(config: &DedupConfig) -> Result<Arc<dyn BaselineStore>> {
    match config.store.as_str() {
        "memory" => Ok(Arc::new(InMemoryBaselineStore::new())),
        "sqlite" => Ok(Arc::new(SqliteBaselineStore::open(&config.path).await?)),
        other => bail!("Unknown dedup store: {}", other),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Acceptors
// ═══════════════════════════════════════════════════════════════════════

/// Decides whether `new` replaces the baseline `old`.
///
/// Only called when `new != old`.
#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn accept(&self, new: &str, old: &str) -> Result<bool>;
}

#[async_trait]
impl<A: Acceptor + ?Sized> Acceptor for Arc<A> {
    async fn accept(&self, new: &str, old: &str) -> Result<bool> {
        (**self).accept(new, old).await
    }
}

/// An [`Acceptor`] backed by a plain function.
pub struct FnAcceptor<F>(F);

impl<F> FnAcceptor<F>
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Acceptor for FnAcceptor<F>
where
    F: Fn(&str, &str) -> bool + Send + Sync,
{
    async fn accept(&self, new: &str, old: &str) -> Result<bool> {
        Ok((self.0)(new, old))
    }
}

/// Asks the chat model whether two responses are deviating.
///
/// A reply containing "yes" (any case) means deviating. Any other reply,
/// including an unexpected one, means not deviating.
pub struct OracleAcceptor {
    model: Arc<dyn ChatModel>,
    options: CompletionOptions,
}

impl OracleAcceptor {
    pub fn new(model: Arc<dyn ChatModel>, config: &ChatConfig) -> Self {
        Self {
            model,
            options: CompletionOptions {
                model: config.model.clone(),
                temperature: 0.0,
                max_tokens: config.oracle_max_tokens,
            },
        }
    }
}

#[async_trait]
impl Acceptor for OracleAcceptor {
    async fn accept(&self, new: &str, old: &str) -> Result<bool> {
        let decision = self
            .model
            .complete(&compare_prompt(new, old), &self.options)
            .await
            .map_err(|e| SentinelError::external(Stage::Oracle, e))?;
        Ok(is_affirmative(&decision))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Reducer
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of offering a value to the reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No baseline existed; accepted unconditionally.
    FirstResponse,
    /// The acceptor judged the value different; accepted.
    Deviating,
    /// Byte-identical to the baseline; suppressed.
    Identical,
    /// The acceptor judged the value equivalent; suppressed.
    Equivalent,
    /// The acceptor failed; suppressed.
    AcceptorFailed,
}

impl Decision {
    pub fn is_accepted(self) -> bool {
        matches!(self, Decision::FirstResponse | Decision::Deviating)
    }
}

pub struct DedupReducer<S, A> {
    store: S,
    acceptor: A,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: BaselineStore, A: Acceptor> DedupReducer<S, A> {
    pub fn new(store: S, acceptor: A) -> Self {
        Self {
            store,
            acceptor,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Offer `value` for `key` and update the baseline if it is accepted.
    ///
    /// Errors come only from the baseline store; acceptor failures are
    /// logged and treated as "not deviating".
    pub async fn offer(&self, key: &str, value: &str) -> Result<Decision> {
        let lock = self.key_lock(key);
        let decision = {
            let _guard = lock.lock().await;
            self.decide(key, value).await
        };
        drop(lock);
        self.release(key);
        decision
    }

    /// The current baseline for `key`, if any.
    pub async fn baseline(&self, key: &str) -> Result<Option<String>> {
        self.store.get(key).await
    }

    async fn decide(&self, key: &str, value: &str) -> Result<Decision> {
        let decision = match self.store.get(key).await? {
            None => Decision::FirstResponse,
            Some(old) if old == value => Decision::Identical,
            Some(old) => match self.acceptor.accept(value, &old).await {
                Ok(true) => Decision::Deviating,
                Ok(false) => Decision::Equivalent,
                Err(e) => {
                    let stage = match e.downcast_ref::<SentinelError>() {
                        Some(SentinelError::ExternalCall { stage, .. }) => Some(*stage),
                        _ => None,
                    };
                    warn!(
                        key,
                        stage = stage.map(tracing::field::display),
                        error = %e,
                        "acceptor failed; treating response as not deviating"
                    );
                    Decision::AcceptorFailed
                }
            },
        };

        if decision.is_accepted() {
            self.store.put(key, value).await?;
        }
        Ok(decision)
    }

    fn key_lock(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(key.to_string()).or_default().clone()
    }

    /// Drop the per-key lock once nobody else holds or waits on it.
    fn release(&self, key: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}
