//! Label store queries
//!
//! The pipeline only reads unclassified labels and writes classification
//! columns. First-time classification is write-once: the update is guarded by
//! `main_category IS NULL`. Corrective rewrites of classified labels are
//! reserved for the repair functions at the end of this module.

use chrono::Utc;
use pstag_common::db::{Label, NewLabel, OriginCategory, SENTINELS};
use pstag_common::{Error, MainCategory, Result};
use serde::Serialize;
use sqlx::SqlitePool;

use super::retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Legacy rows may hold a text sentinel in the REAL `confidence` column; it
/// reads back as NULL.
const LABEL_COLUMNS: &str = "name, origin_category, usage_count, main_category, sub_category, \
     classification_source, \
     CASE WHEN typeof(confidence) IN ('real', 'integer') THEN confidence END AS confidence, \
     reasoning, is_ambiguous, note, classified_at";

/// Classified / total label counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Coverage {
    pub total: i64,
    pub classified: i64,
}

impl Coverage {
    /// Classified share as a percentage; an empty store has 0% coverage
    pub fn percent(&self) -> f64 {
        if self.total <= 0 {
            0.0
        } else {
            self.classified as f64 * 100.0 / self.total as f64
        }
    }

    pub fn unclassified(&self) -> i64 {
        self.total - self.classified
    }
}

/// Position in a usage-descending scan, exclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageCursor {
    pub usage_count: i64,
    pub name: String,
}

impl From<&Label> for UsageCursor {
    fn from(label: &Label) -> Self {
        Self {
            usage_count: label.usage_count,
            name: label.name.clone(),
        }
    }
}

/// A primary classification to record
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment<'a> {
    pub main: MainCategory,
    pub sub: Option<&'a str>,
    pub source: &'a str,
    pub confidence: f64,
    pub reasoning: Option<&'a str>,
}

/// Insert labels, updating origin and usage for names already present
///
/// Classification columns of existing rows are left untouched.
pub async fn import_labels(pool: &SqlitePool, labels: &[NewLabel]) -> Result<u64> {
    let mut tx = pool.begin().await?;
    let mut written = 0;
    for label in labels {
        if label.usage_count < 0 {
            return Err(Error::InvalidInput(format!(
                "negative usage count for '{}'",
                label.name
            )));
        }
        let result = sqlx::query(
            r#"
            INSERT INTO labels (name, origin_category, usage_count)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                origin_category = excluded.origin_category,
                usage_count = excluded.usage_count
            "#,
        )
        .bind(&label.name)
        .bind(label.origin.code())
        .bind(label.usage_count)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

/// Parse `name,origin_category,usage_count` rows
///
/// A leading header row starting with `name` is skipped, as are blank lines.
/// Names may contain commas; the last two fields are split from the right.
pub fn parse_label_rows(text: &str) -> Result<Vec<NewLabel>> {
    let mut labels = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || (index == 0 && line.to_ascii_lowercase().starts_with("name")) {
            continue;
        }
        let mut fields = line.rsplitn(3, ',');
        let (Some(usage), Some(origin), Some(name)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(Error::InvalidInput(format!(
                "line {}: expected name,origin_category,usage_count",
                index + 1
            )));
        };
        let usage_count: i64 = usage.trim().parse().map_err(|_| {
            Error::InvalidInput(format!("line {}: bad usage count '{}'", index + 1, usage))
        })?;
        let origin: i64 = origin.trim().parse().map_err(|_| {
            Error::InvalidInput(format!("line {}: bad origin category '{}'", index + 1, origin))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidInput(format!("line {}: empty name", index + 1)));
        }
        labels.push(NewLabel::new(name, OriginCategory::from_code(origin), usage_count));
    }
    Ok(labels)
}

pub async fn get_label(pool: &SqlitePool, name: &str) -> Result<Option<Label>> {
    let label = sqlx::query_as::<_, Label>(&format!(
        "SELECT {} FROM labels WHERE name = ?",
        LABEL_COLUMNS
    ))
    .bind(name)
    .fetch_optional(pool)
    .await?;
    Ok(label)
}

/// Unclassified labels with `min_count <= usage_count < max_count`, most used first
///
/// Pass the last returned label as `after` to fetch the next page. Ties on
/// usage are broken by name so paging is stable.
pub async fn fetch_unclassified(
    pool: &SqlitePool,
    min_count: i64,
    max_count: Option<i64>,
    after: Option<&UsageCursor>,
    limit: i64,
) -> Result<Vec<Label>> {
    let (cursor_usage, cursor_name) = match after {
        Some(cursor) => (Some(cursor.usage_count), Some(cursor.name.as_str())),
        None => (None, None),
    };

    let labels = sqlx::query_as::<_, Label>(&format!(
        r#"
        SELECT {}
        FROM labels
        WHERE main_category IS NULL
          AND usage_count >= ?
          AND (? IS NULL OR usage_count < ?)
          AND (? IS NULL OR usage_count < ? OR (usage_count = ? AND name > ?))
        ORDER BY usage_count DESC, name ASC
        LIMIT ?
        "#,
        LABEL_COLUMNS
    ))
    .bind(min_count)
    .bind(max_count)
    .bind(max_count)
    .bind(cursor_usage)
    .bind(cursor_usage)
    .bind(cursor_usage)
    .bind(cursor_name)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(labels)
}

pub async fn count_unclassified(pool: &SqlitePool, min_count: i64, max_count: Option<i64>) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM labels
        WHERE main_category IS NULL
          AND usage_count >= ?
          AND (? IS NULL OR usage_count < ?)
        "#,
    )
    .bind(min_count)
    .bind(max_count)
    .bind(max_count)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Record a first-time classification
///
/// Returns `false` when the label no longer exists or is already classified;
/// an existing classification is never overwritten here.
pub async fn record_classification(pool: &SqlitePool, name: &str, assignment: &Assignment<'_>) -> Result<bool> {
    let main = assignment.main.code();
    let confidence = assignment.confidence.clamp(0.0, 1.0);
    let classified_at = Utc::now().to_rfc3339();

    retry_on_lock("record_classification", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE labels SET
                main_category = ?,
                sub_category = ?,
                classification_source = ?,
                confidence = ?,
                reasoning = ?,
                classified_at = ?
            WHERE name = ? AND main_category IS NULL
            "#,
        )
        .bind(main)
        .bind(assignment.sub)
        .bind(assignment.source)
        .bind(confidence)
        .bind(assignment.reasoning)
        .bind(&classified_at)
        .bind(name)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    })
    .await
}

pub async fn coverage(pool: &SqlitePool) -> Result<Coverage> {
    let (total, classified): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(main_category) FROM labels",
    )
    .fetch_one(pool)
    .await?;
    Ok(Coverage { total, classified })
}

/// Label counts per main category, largest first; unclassified labels are omitted
pub async fn category_distribution(pool: &SqlitePool) -> Result<Vec<(String, i64)>> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        r#"
        SELECT main_category, COUNT(*) AS n
        FROM labels
        WHERE main_category IS NOT NULL
        GROUP BY main_category
        ORDER BY n DESC, main_category ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_ambiguous(pool: &SqlitePool) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM labels WHERE is_ambiguous = 1")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

// Repair queries

fn sentinel_condition(column: &str) -> String {
    let values: Vec<String> = SENTINELS.iter().map(|s| format!("'{}'", s)).collect();
    format!("LOWER(TRIM({})) IN ({})", column, values.join(", "))
}

/// Text columns that legacy writers may have filled with a sentinel
const SENTINEL_COLUMNS: [&str; 5] = [
    "main_category",
    "sub_category",
    "classification_source",
    "reasoning",
    "note",
];

/// Rewrite sentinel strings to NULL; returns `(examined, changed)` row counts
///
/// A sentinel main category means the label was never really classified, so
/// the whole classification is cleared and a note records why.
pub async fn clear_sentinels(pool: &SqlitePool, cleared_note: &str) -> Result<(u64, u64)> {
    let mut tx = pool.begin().await?;

    let examined: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM labels")
        .fetch_one(&mut *tx)
        .await?;

    let mut any = SENTINEL_COLUMNS
        .iter()
        .map(|c| sentinel_condition(c))
        .collect::<Vec<_>>();
    any.push(sentinel_condition("confidence"));
    let changed: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM labels WHERE {}",
        any.join(" OR ")
    ))
    .fetch_one(&mut *tx)
    .await?;

    if changed > 0 {
        let note_is_empty = format!("note IS NULL OR {}", sentinel_condition("note"));
        sqlx::query(&format!(
            r#"
            UPDATE labels SET
                main_category = NULL,
                sub_category = NULL,
                classification_source = NULL,
                confidence = NULL,
                reasoning = NULL,
                classified_at = NULL,
                note = CASE WHEN {} THEN ? ELSE note || '; ' || ? END
            WHERE {}
            "#,
            note_is_empty,
            sentinel_condition("main_category")
        ))
        .bind(cleared_note)
        .bind(cleared_note)
        .execute(&mut *tx)
        .await?;

        for column in SENTINEL_COLUMNS.iter().skip(1).copied().chain(["confidence"]) {
            sqlx::query(&format!(
                "UPDATE labels SET {} = NULL WHERE {}",
                column,
                sentinel_condition(column)
            ))
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok((examined.max(0) as u64, changed.max(0) as u64))
}

/// Classified labels whose name ends with `suffix`
pub async fn fetch_classified_with_suffix(pool: &SqlitePool, suffix: &str) -> Result<Vec<Label>> {
    let escaped = suffix
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    let labels = sqlx::query_as::<_, Label>(&format!(
        r#"
        SELECT {}
        FROM labels
        WHERE main_category IS NOT NULL
          AND name LIKE ? ESCAPE '\'
        ORDER BY name
        "#,
        LABEL_COLUMNS
    ))
    .bind(format!("%{}", escaped))
    .fetch_all(pool)
    .await?;
    Ok(labels)
}

/// Corrective rewrite of an existing classification
///
/// `note` is appended to any existing note.
#[allow(clippy::too_many_arguments)]
pub async fn rewrite_classification(
    pool: &SqlitePool,
    name: &str,
    main: &str,
    sub: Option<&str>,
    source: &str,
    confidence: Option<f64>,
    reasoning: Option<&str>,
    note: &str,
) -> Result<bool> {
    let classified_at = Utc::now().to_rfc3339();
    let confidence = confidence.map(|c| c.clamp(0.0, 1.0));

    retry_on_lock("rewrite_classification", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            UPDATE labels SET
                main_category = ?,
                sub_category = ?,
                classification_source = ?,
                confidence = ?,
                reasoning = COALESCE(?, reasoning),
                classified_at = ?,
                note = CASE WHEN note IS NULL OR note = '' THEN ? ELSE note || '; ' || ? END
            WHERE name = ?
            "#,
        )
        .bind(main)
        .bind(sub)
        .bind(source)
        .bind(confidence)
        .bind(reasoning)
        .bind(&classified_at)
        .bind(note)
        .bind(note)
        .bind(name)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    })
    .await
}

/// Classified labels with confidence below `floor`
pub async fn count_low_confidence(pool: &SqlitePool, floor: f64) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM labels WHERE main_category IS NOT NULL AND confidence < ?",
    )
    .bind(floor)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Flag low-confidence labels as ambiguous; returns rows newly flagged
///
/// Labels named in `exclude` are skipped.
pub async fn flag_low_confidence(pool: &SqlitePool, floor: f64, note: &str, exclude: &[String]) -> Result<u64> {
    let exclusions = if exclude.is_empty() {
        String::new()
    } else {
        format!(" AND name NOT IN ({})", vec!["?"; exclude.len()].join(", "))
    };
    let sql = format!(
        r#"
        UPDATE labels SET
            is_ambiguous = 1,
            note = CASE WHEN note IS NULL OR note = '' THEN ? ELSE note || '; ' || ? END
        WHERE main_category IS NOT NULL
          AND confidence < ?
          AND is_ambiguous = 0{}
        "#,
        exclusions
    );

    let mut query = sqlx::query(&sql).bind(note).bind(note).bind(floor);
    for name in exclude {
        query = query.bind(name);
    }
    let result = query.execute(pool).await?;
    Ok(result.rows_affected())
}

/// Clear the ambiguity flag on one label
pub async fn clear_ambiguous(pool: &SqlitePool, name: &str) -> Result<()> {
    sqlx::query("UPDATE labels SET is_ambiguous = 0 WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}
