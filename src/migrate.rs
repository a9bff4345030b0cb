use anyhow::Result;
use sqlx::SqlitePool;

/// Create the dedup schema. Idempotent.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS dedup_baselines (
            query_id TEXT PRIMARY KEY,
            response TEXT NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_dedup_baselines_updated_at ON dedup_baselines(updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
