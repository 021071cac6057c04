//! Label store test utilities

use anyhow::Result;
use pstag_classify::db::labels;
use pstag_common::db::{init_database, Label, NewLabel, OriginCategory};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// In-memory label store with the schema applied
pub async fn create_test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    pstag_common::db::create_schema(&pool).await.unwrap();
    pool
}

/// On-disk label store in a temporary directory
///
/// Keep the `TempDir` alive for the duration of the test.
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let pool = init_database(&temp_dir.path().join("tags.db")).await?;
    Ok((temp_dir, pool))
}

/// Seed `(name, origin code, usage_count)` rows
pub async fn seed_labels(pool: &SqlitePool, rows: &[(&str, i64, i64)]) {
    let labels: Vec<NewLabel> = rows
        .iter()
        .map(|(name, origin, usage)| NewLabel::new(*name, OriginCategory::from_code(*origin), *usage))
        .collect();
    labels::import_labels(pool, &labels).await.unwrap();
}

/// Write raw classification values, bypassing validation (legacy data)
pub async fn set_classification(
    pool: &SqlitePool,
    name: &str,
    main: Option<&str>,
    sub: Option<&str>,
    source: Option<&str>,
    confidence: Option<f64>,
) {
    sqlx::query(
        r#"
        UPDATE labels SET
            main_category = ?,
            sub_category = ?,
            classification_source = ?,
            confidence = ?
        WHERE name = ?
        "#,
    )
    .bind(main)
    .bind(sub)
    .bind(source)
    .bind(confidence)
    .bind(name)
    .execute(pool)
    .await
    .unwrap();
}

/// Store a text value in the REAL confidence column, as legacy writers did
pub async fn set_raw_confidence(pool: &SqlitePool, name: &str, value: &str) {
    sqlx::query("UPDATE labels SET confidence = ? WHERE name = ?")
        .bind(value)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn fetch_label(pool: &SqlitePool, name: &str) -> Label {
    labels::get_label(pool, name)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("label {} not found", name))
}

/// Every label, ordered by name
pub async fn all_labels(pool: &SqlitePool) -> Vec<Label> {
    sqlx::query_as::<_, Label>(
        "SELECT name, origin_category, usage_count, main_category, sub_category, \
         classification_source, \
         CASE WHEN typeof(confidence) IN ('real', 'integer') THEN confidence END AS confidence, \
         reasoning, is_ambiguous, note, classified_at \
         FROM labels ORDER BY name",
    )
    .fetch_all(pool)
    .await
    .unwrap()
}
