//! Label store initialization
//!
//! Creates the database file on first run and brings the schema up to date.
//! Every `create_*` function is idempotent.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Open (creating if needed) the label store at `db_path`
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Single writer: the pipeline never writes concurrently
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create all tables and indexes
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_labels_table(pool).await?;
    create_pipeline_runs_table(pool).await?;
    create_pipeline_checkpoints_table(pool).await?;
    Ok(())
}

async fn create_labels_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS labels (
            name TEXT PRIMARY KEY,
            origin_category INTEGER NOT NULL DEFAULT 0,
            usage_count INTEGER NOT NULL DEFAULT 0 CHECK (usage_count >= 0),
            main_category TEXT,
            sub_category TEXT,
            classification_source TEXT,
            confidence REAL,
            reasoning TEXT,
            is_ambiguous INTEGER NOT NULL DEFAULT 0,
            note TEXT,
            classified_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_labels_main_usage ON labels(main_category, usage_count)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_pipeline_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_runs (
            run_id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            tiers TEXT NOT NULL,
            current_tier INTEGER NOT NULL DEFAULT 0,
            resume_token TEXT UNIQUE,
            spent_cost REAL NOT NULL DEFAULT 0,
            budget_ceiling REAL,
            target_coverage REAL NOT NULL,
            last_checkpoint TEXT,
            started_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            ended_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_pipeline_checkpoints_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipeline_checkpoints (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT,
            phase TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            processed INTEGER NOT NULL,
            succeeded INTEGER NOT NULL,
            success_rate REAL NOT NULL,
            mean_confidence REAL,
            coverage REAL NOT NULL,
            success_rating TEXT NOT NULL,
            confidence_rating TEXT NOT NULL,
            coverage_band TEXT NOT NULL,
            payload TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_checkpoints_run ON pipeline_checkpoints(run_id, id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
