//! Periodic quality gate
//!
//! A checkpoint summarizes the labels processed since the previous one:
//! success rate, confidence of the accepted results and global coverage of
//! the label store. Ratings are advisory; the orchestrator decides whether a
//! warning pauses the run.

use crate::db::labels;
use chrono::{DateTime, Utc};
use pstag_common::config::RatingsSection;
use pstag_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;
use std::fmt::Write as _;
use tracing::{info, warn};

/// Qualitative rating of a ratio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rating {
    Excellent,
    Good,
    Warning,
}

impl Rating {
    pub fn grade(value: f64, excellent: f64, good: f64) -> Self {
        if value >= excellent {
            Rating::Excellent
        } else if value >= good {
            Rating::Good
        } else {
            Rating::Warning
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Rating::Excellent => "EXCELLENT",
            Rating::Good => "GOOD",
            Rating::Warning => "WARNING",
        })
    }
}

/// Progress towards the target coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverageBand {
    TargetReached,
    /// Within 3 points of the target
    NearTarget,
    /// Within 5 points of the target
    GoodProgress,
    SteadyProgress,
}

impl CoverageBand {
    pub fn classify(coverage: f64, target: f64) -> Self {
        if coverage >= target {
            CoverageBand::TargetReached
        } else if coverage >= target - 3.0 {
            CoverageBand::NearTarget
        } else if coverage >= target - 5.0 {
            CoverageBand::GoodProgress
        } else {
            CoverageBand::SteadyProgress
        }
    }
}

impl fmt::Display for CoverageBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoverageBand::TargetReached => "target reached",
            CoverageBand::NearTarget => "near target",
            CoverageBand::GoodProgress => "good progress",
            CoverageBand::SteadyProgress => "steady progress",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingThresholds {
    pub success_excellent: f64,
    pub success_good: f64,
    pub confidence_excellent: f64,
    pub confidence_good: f64,
}

impl RatingThresholds {
    pub fn from_section(section: &RatingsSection) -> Self {
        Self {
            success_excellent: section.success_excellent,
            success_good: section.success_good,
            confidence_excellent: section.confidence_excellent,
            confidence_good: section.confidence_good,
        }
    }
}

impl Default for RatingThresholds {
    fn default() -> Self {
        Self::from_section(&RatingsSection::default())
    }
}

/// Aggregate of the confidence samples in one checkpoint window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub count: usize,
    pub mean: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl ConfidenceSummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        let values: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return Self::default();
        }
        let sum: f64 = values.iter().sum();
        Self {
            count: values.len(),
            mean: Some(sum / values.len() as f64),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub timestamp: DateTime<Utc>,
    pub phase: String,
    pub processed: u64,
    pub succeeded: u64,
    pub success_rate: f64,
    pub confidence: ConfidenceSummary,
    /// Percentage of labels in the store with a main category
    pub coverage: f64,
    pub success_rating: Rating,
    pub confidence_rating: Rating,
    pub coverage_band: CoverageBand,
}

impl Checkpoint {
    /// Whether either rating calls for operator attention
    pub fn has_warning(&self) -> bool {
        self.success_rating == Rating::Warning || self.confidence_rating == Rating::Warning
    }
}

/// Totals over a checkpoint history
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HistorySummary {
    pub count: usize,
    pub processed: u64,
    pub succeeded: u64,
    pub mean_success_rate: Option<f64>,
    pub mean_confidence: Option<f64>,
    pub first_coverage: Option<f64>,
    pub last_coverage: Option<f64>,
    pub warnings: usize,
}

impl HistorySummary {
    pub fn from_checkpoints(checkpoints: &[Checkpoint]) -> Self {
        if checkpoints.is_empty() {
            return Self::default();
        }
        let count = checkpoints.len();
        let confidences: Vec<f64> = checkpoints.iter().filter_map(|c| c.confidence.mean).collect();
        Self {
            count,
            processed: checkpoints.iter().map(|c| c.processed).sum(),
            succeeded: checkpoints.iter().map(|c| c.succeeded).sum(),
            mean_success_rate: Some(
                checkpoints.iter().map(|c| c.success_rate).sum::<f64>() / count as f64,
            ),
            mean_confidence: (!confidences.is_empty())
                .then(|| confidences.iter().sum::<f64>() / confidences.len() as f64),
            first_coverage: checkpoints.first().map(|c| c.coverage),
            last_coverage: checkpoints.last().map(|c| c.coverage),
            warnings: checkpoints.iter().filter(|c| c.has_warning()).count(),
        }
    }
}

/// Computes checkpoints and keeps their history
pub struct CheckpointEvaluator {
    pool: SqlitePool,
    target_coverage: f64,
    thresholds: RatingThresholds,
    history: Vec<Checkpoint>,
}

impl CheckpointEvaluator {
    pub fn new(pool: SqlitePool, target_coverage: f64, thresholds: RatingThresholds) -> Self {
        Self {
            pool,
            target_coverage,
            thresholds,
            history: Vec::new(),
        }
    }

    pub fn target_coverage(&self) -> f64 {
        self.target_coverage
    }

    /// Compute a checkpoint, reading current coverage from the label store
    pub async fn evaluate(
        &mut self,
        processed: u64,
        succeeded: u64,
        confidence_samples: &[f64],
        phase: &str,
    ) -> Result<Checkpoint> {
        let coverage = labels::coverage(&self.pool).await?.percent();
        let checkpoint = self.assess(processed, succeeded, confidence_samples, phase, coverage);

        if checkpoint.has_warning() {
            warn!(
                phase = %checkpoint.phase,
                processed,
                success_rate = checkpoint.success_rate,
                mean_confidence = ?checkpoint.confidence.mean,
                success_rating = %checkpoint.success_rating,
                confidence_rating = %checkpoint.confidence_rating,
                "Checkpoint rated WARNING"
            );
        } else {
            info!(
                phase = %checkpoint.phase,
                processed,
                success_rate = checkpoint.success_rate,
                mean_confidence = ?checkpoint.confidence.mean,
                coverage = checkpoint.coverage,
                band = %checkpoint.coverage_band,
                "Checkpoint"
            );
        }

        self.history.push(checkpoint.clone());
        Ok(checkpoint)
    }

    /// Build a checkpoint from an already-known coverage value
    pub fn assess(
        &self,
        processed: u64,
        succeeded: u64,
        confidence_samples: &[f64],
        phase: &str,
        coverage: f64,
    ) -> Checkpoint {
        let success_rate = if processed == 0 {
            0.0
        } else {
            (succeeded.min(processed) as f64) / processed as f64
        };
        let confidence = ConfidenceSummary::from_samples(confidence_samples);
        let t = &self.thresholds;

        Checkpoint {
            timestamp: Utc::now(),
            phase: phase.to_string(),
            processed,
            succeeded,
            success_rate,
            confidence,
            coverage,
            success_rating: Rating::grade(success_rate, t.success_excellent, t.success_good),
            confidence_rating: confidence
                .mean
                .map_or(Rating::Warning, |mean| {
                    Rating::grade(mean, t.confidence_excellent, t.confidence_good)
                }),
            coverage_band: CoverageBand::classify(coverage, self.target_coverage),
        }
    }

    pub fn history(&self) -> &[Checkpoint] {
        &self.history
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary::from_checkpoints(&self.history)
    }
}

/// Markdown progress report over a checkpoint history
pub fn render_report(checkpoints: &[Checkpoint], target_coverage: f64) -> String {
    let summary = HistorySummary::from_checkpoints(checkpoints);
    let mut out = String::new();

    let _ = writeln!(out, "# Classification Progress Report\n");
    let _ = writeln!(out, "- Checkpoints: {}", summary.count);
    let _ = writeln!(out, "- Labels processed: {}", summary.processed);
    let _ = writeln!(out, "- Labels accepted: {}", summary.succeeded);
    if let Some(rate) = summary.mean_success_rate {
        let _ = writeln!(out, "- Mean success rate: {:.1}%", rate * 100.0);
    }
    if let Some(confidence) = summary.mean_confidence {
        let _ = writeln!(out, "- Mean confidence: {:.3}", confidence);
    }
    if let (Some(first), Some(last)) = (summary.first_coverage, summary.last_coverage) {
        let _ = writeln!(
            out,
            "- Coverage: {:.2}% -> {:.2}% (target {:.1}%)",
            first, last, target_coverage
        );
    }
    let _ = writeln!(out, "- Warnings: {}", summary.warnings);

    if checkpoints.is_empty() {
        let _ = writeln!(out, "\nNo checkpoints recorded.");
        return out;
    }

    let _ = writeln!(out, "\n## Checkpoints\n");
    let _ = writeln!(
        out,
        "| Time (UTC) | Phase | Processed | Success | Rating | Confidence | Rating | Coverage | Progress |"
    );
    let _ = writeln!(out, "|---|---|---:|---:|---|---:|---|---:|---|");
    for c in checkpoints {
        let confidence = c
            .confidence
            .mean
            .map_or_else(|| "-".to_string(), |m| format!("{:.3}", m));
        let _ = writeln!(
            out,
            "| {} | {} | {} | {:.1}% | {} | {} | {} | {:.2}% | {} |",
            c.timestamp.format("%Y-%m-%d %H:%M:%S"),
            c.phase,
            c.processed,
            c.success_rate * 100.0,
            c.success_rating,
            confidence,
            c.confidence_rating,
            c.coverage,
            c.coverage_band
        );
    }
    out
}
