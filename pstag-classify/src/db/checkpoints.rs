//! Persisted checkpoint history (append-only)

use crate::checkpoint::Checkpoint;
use pstag_common::Result;
use sqlx::SqlitePool;
use uuid::Uuid;

pub async fn insert_checkpoint(pool: &SqlitePool, run_id: Option<Uuid>, checkpoint: &Checkpoint) -> Result<i64> {
    let payload = serde_json::to_string(checkpoint)?;
    let success_rating = serde_json::to_value(checkpoint.success_rating)?;
    let confidence_rating = serde_json::to_value(checkpoint.confidence_rating)?;
    let coverage_band = serde_json::to_value(checkpoint.coverage_band)?;

    let result = sqlx::query(
        r#"
        INSERT INTO pipeline_checkpoints (
            run_id, phase, created_at, processed, succeeded, success_rate,
            mean_confidence, coverage, success_rating, confidence_rating,
            coverage_band, payload
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(run_id.map(|id| id.to_string()))
    .bind(&checkpoint.phase)
    .bind(checkpoint.timestamp.to_rfc3339())
    .bind(checkpoint.processed as i64)
    .bind(checkpoint.succeeded as i64)
    .bind(checkpoint.success_rate)
    .bind(checkpoint.confidence.mean)
    .bind(checkpoint.coverage)
    .bind(success_rating.as_str().unwrap_or_default())
    .bind(confidence_rating.as_str().unwrap_or_default())
    .bind(coverage_band.as_str().unwrap_or_default())
    .bind(&payload)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Checkpoints in insertion order; `None` returns every run's history
pub async fn list_checkpoints(pool: &SqlitePool, run_id: Option<Uuid>) -> Result<Vec<Checkpoint>> {
    let payloads: Vec<String> = sqlx::query_scalar(
        r#"
        SELECT payload FROM pipeline_checkpoints
        WHERE ? IS NULL OR run_id = ?
        ORDER BY id ASC
        "#,
    )
    .bind(run_id.map(|id| id.to_string()))
    .bind(run_id.map(|id| id.to_string()))
    .fetch_all(pool)
    .await?;

    payloads
        .iter()
        .map(|p| serde_json::from_str::<Checkpoint>(p).map_err(pstag_common::Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{CheckpointEvaluator, RatingThresholds};
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_history_per_run() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pstag_common::db::create_schema(&pool).await.unwrap();
        let evaluator = CheckpointEvaluator::new(pool.clone(), 96.0, RatingThresholds::default());

        let run_a = Uuid::new_v4();
        let run_b = Uuid::new_v4();
        insert_checkpoint(&pool, Some(run_a), &evaluator.assess(10, 10, &[1.0], "first", 10.0))
            .await
            .unwrap();
        insert_checkpoint(&pool, Some(run_b), &evaluator.assess(10, 5, &[0.5], "other", 11.0))
            .await
            .unwrap();
        insert_checkpoint(&pool, Some(run_a), &evaluator.assess(10, 9, &[0.9], "second", 12.0))
            .await
            .unwrap();

        let phases: Vec<String> = list_checkpoints(&pool, Some(run_a))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.phase)
            .collect();
        assert_eq!(phases, vec!["first", "second"]);
        assert_eq!(list_checkpoints(&pool, None).await.unwrap().len(), 3);

        let rating: String = sqlx::query_scalar(
            "SELECT success_rating FROM pipeline_checkpoints WHERE phase = 'other'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(rating, "WARNING");
    }
}
