//! SQLite persistence for dedup baselines.
//!
//! With `dedup.store = "sqlite"` the last accepted response per query id
//! survives restarts, so a repeated alert-enabled query is compared against
//! what was last announced rather than announced again.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

use crate::dedup::BaselineStore;
use crate::migrate::run_migrations;

pub async fn connect(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// [`BaselineStore`] backed by the `dedup_baselines` table.
pub struct SqliteBaselineStore {
    pool: SqlitePool,
}

impl SqliteBaselineStore {
    /// Open (creating if needed) the database at `path` and migrate it.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = connect(path).await?;
        run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl BaselineStore for SqliteBaselineStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let response: Option<String> =
            sqlx::query_scalar("SELECT response FROM dedup_baselines WHERE query_id = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(response)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO dedup_baselines (query_id, response, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(query_id) DO UPDATE SET
                response = excluded.response,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
