//! Pipeline run persistence

use crate::models::{PipelineRun, RunStatus};
use chrono::{DateTime, Utc};
use pstag_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Insert or update a run
pub async fn save_run(pool: &SqlitePool, run: &PipelineRun) -> Result<()> {
    // Serialize before touching the database
    let run_id = run.run_id.to_string();
    let tiers = serde_json::to_string(&run.tiers)?;
    let last_checkpoint = run
        .last_checkpoint
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let current_tier = run.current_tier as i64;
    let started_at = run.started_at.to_rfc3339();
    let updated_at = run.updated_at.to_rfc3339();
    let ended_at = run.ended_at.map(|t| t.to_rfc3339());

    retry_on_lock("save_run", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (
                run_id, status, tiers, current_tier, resume_token, spent_cost,
                budget_ceiling, target_coverage, last_checkpoint,
                started_at, updated_at, ended_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                status = excluded.status,
                current_tier = excluded.current_tier,
                resume_token = excluded.resume_token,
                spent_cost = excluded.spent_cost,
                last_checkpoint = excluded.last_checkpoint,
                updated_at = excluded.updated_at,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(&run_id)
        .bind(run.status.as_str())
        .bind(&tiers)
        .bind(current_tier)
        .bind(&run.resume_token)
        .bind(run.spent_cost)
        .bind(run.budget_ceiling)
        .bind(run.target_coverage)
        .bind(&last_checkpoint)
        .bind(&started_at)
        .bind(&updated_at)
        .bind(&ended_at)
        .execute(pool)
        .await?;
        Ok(())
    })
    .await
}

pub async fn load_run(pool: &SqlitePool, run_id: Uuid) -> Result<Option<PipelineRun>> {
    let row = sqlx::query("SELECT * FROM pipeline_runs WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(|r| run_from_row(&r)).transpose()
}

/// Paused run holding `token`
pub async fn find_by_resume_token(pool: &SqlitePool, token: &str) -> Result<Option<PipelineRun>> {
    let row = sqlx::query("SELECT * FROM pipeline_runs WHERE resume_token = ? AND status = 'PAUSED'")
        .bind(token)
        .fetch_optional(pool)
        .await?;
    row.map(|r| run_from_row(&r)).transpose()
}

/// Most recently started runs first
pub async fn list_runs(pool: &SqlitePool, limit: i64) -> Result<Vec<PipelineRun>> {
    let rows = sqlx::query("SELECT * FROM pipeline_runs ORDER BY started_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.iter().map(run_from_row).collect()
}

fn run_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PipelineRun> {
    let run_id: String = row.get("run_id");
    let status: String = row.get("status");
    let tiers: String = row.get("tiers");
    let current_tier: i64 = row.get("current_tier");
    let last_checkpoint: Option<String> = row.get("last_checkpoint");
    let started_at: String = row.get("started_at");
    let updated_at: String = row.get("updated_at");
    let ended_at: Option<String> = row.get("ended_at");

    Ok(PipelineRun {
        run_id: Uuid::parse_str(&run_id)
            .map_err(|e| Error::Internal(format!("Invalid run id '{}': {}", run_id, e)))?,
        status: status.parse::<RunStatus>()?,
        tiers: serde_json::from_str(&tiers)?,
        current_tier: current_tier.max(0) as usize,
        resume_token: row.get("resume_token"),
        spent_cost: row.get("spent_cost"),
        budget_ceiling: row.get("budget_ceiling"),
        target_coverage: row.get("target_coverage"),
        last_checkpoint: last_checkpoint
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        started_at: parse_timestamp(&started_at)?,
        updated_at: parse_timestamp(&updated_at)?,
        ended_at: ended_at.as_deref().map(parse_timestamp).transpose()?,
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp '{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointEvaluator, RatingThresholds};
    use sqlx::sqlite::SqlitePoolOptions;

    async fn pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pstag_common::db::create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_save_and_load_paused_run() {
        let pool = pool().await;
        let evaluator = CheckpointEvaluator::new(pool.clone(), 96.0, RatingThresholds::default());
        let checkpoint = evaluator.assess(10, 8, &[0.9], "1K-3K", 42.0);

        let mut run = PipelineRun::new(vec!["1K-3K".into(), "<1K".into()], Some(2.5), 96.0);
        run.spent_cost = 0.25;
        save_run(&pool, &run).await.unwrap();
        let token = run.pause(checkpoint.clone());
        save_run(&pool, &run).await.unwrap();

        let loaded = find_by_resume_token(&pool, &token).await.unwrap().unwrap();
        assert_eq!(loaded.run_id, run.run_id);
        assert_eq!(loaded.status, RunStatus::Paused);
        assert_eq!(loaded.tiers, vec!["1K-3K", "<1K"]);
        assert_eq!(loaded.budget_ceiling, Some(2.5));
        assert_eq!(loaded.spent_cost, 0.25);
        let stored = loaded.last_checkpoint.unwrap();
        assert_eq!(stored.phase, checkpoint.phase);
        assert_eq!(stored.processed, 10);
        assert_eq!(stored.success_rating, checkpoint.success_rating);

        assert!(find_by_resume_token(&pool, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_terminal_run_is_not_resumable() {
        let pool = pool().await;
        let evaluator = CheckpointEvaluator::new(pool.clone(), 96.0, RatingThresholds::default());
        let mut run = PipelineRun::new(vec!["<1K".into()], None, 96.0);
        let token = run.pause(evaluator.assess(1, 0, &[], "<1K", 0.0));
        save_run(&pool, &run).await.unwrap();

        run.transition_to(RunStatus::Abandoned);
        save_run(&pool, &run).await.unwrap();

        assert!(find_by_resume_token(&pool, &token).await.unwrap().is_none());
        let loaded = load_run(&pool, run.run_id).await.unwrap().unwrap();
        assert_eq!(loaded.status, RunStatus::Abandoned);
        assert!(loaded.ended_at.is_some());
        assert_eq!(list_runs(&pool, 10).await.unwrap().len(), 1);
    }
}
