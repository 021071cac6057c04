//! Tier-by-tier classification run
//!
//! For each tier, highest usage band first:
//! 1. **RULE_PASS** - the rule engine classifies every unclassified label it can
//! 2. **EXTERNAL_PASS** - the remainder goes to the external classifier in
//!    adaptively sized batches
//! 3. **CHECKPOINT** - every `checkpoint_interval` labels and at tier end
//!
//! A checkpoint with a WARNING success rating pauses the run and issues a
//! resume token. Cost is estimated as one request per batch and the run halts
//! before a batch that would cross the budget ceiling; retries inside the last
//! admitted batch may still overshoot it. Cancellation is checked between
//! batches only; results of a finished batch are always persisted first.
//!
//! Every read selects labels with `main_category IS NULL`, so a resumed or
//! repeated run continues with whatever is still unclassified.

use crate::batch_adjuster::{AdjustmentSummary, BatchSizeAdjuster, TierProfile};
use crate::checkpoint::{Checkpoint, CheckpointEvaluator, Rating};
use crate::config::PipelineConfig;
use crate::db::{checkpoints, labels, runs, Assignment, UsageCursor};
use crate::error::{PipelineError, PipelineResult};
use crate::external::{CompletionBackend, ExternalClassifier, Sleeper, TokioSleeper};
use crate::models::{Phase, PipelineRun, RunStatus};
use crate::repair::ConsistencyRepairer;
use crate::rules::{RuleClassifier, RuleStats};
use pstag_common::db::Label;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Operator choices for a new run
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Tier names to process; `None` means every configured tier
    pub tiers: Option<Vec<String>>,
    /// Overrides the configured budget ceiling (see `PipelineConfig::budget_ceiling`)
    pub budget_ceiling: Option<f64>,
    /// Overrides the configured target coverage
    pub target_coverage: Option<f64>,
}

/// What a run (or a resumed segment of it) did
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Present when the run paused at a checkpoint
    pub resume_token: Option<String>,
    pub spent_cost: f64,
    pub rule_stats: RuleStats,
    pub external_processed: u64,
    pub external_succeeded: u64,
    pub batches: u64,
    pub checkpoints: Vec<Checkpoint>,
    pub adjustments: AdjustmentSummary,
    /// Tier being processed when the run stopped early
    pub halted_tier: Option<String>,
}

impl RunReport {
    fn new(run: &PipelineRun) -> Self {
        Self {
            run_id: run.run_id,
            status: run.status,
            resume_token: None,
            spent_cost: run.spent_cost,
            rule_stats: RuleStats::default(),
            external_processed: 0,
            external_succeeded: 0,
            batches: 0,
            checkpoints: Vec::new(),
            adjustments: AdjustmentSummary::default(),
            halted_tier: None,
        }
    }
}

/// How the external pass over one tier ended
#[derive(Debug)]
enum TierEnd {
    Completed,
    Paused(Checkpoint),
    BudgetExhausted,
    Cancelled,
}

/// Counters since the last checkpoint
#[derive(Debug, Default)]
struct Window {
    processed: u64,
    succeeded: u64,
    confidences: Vec<f64>,
}

impl Window {
    fn is_empty(&self) -> bool {
        self.processed == 0
    }
}

pub struct Orchestrator {
    pool: SqlitePool,
    config: PipelineConfig,
    rules: RuleClassifier,
    classifier: ExternalClassifier,
    sleeper: Arc<dyn Sleeper>,
}

impl Orchestrator {
    pub fn new(pool: SqlitePool, config: PipelineConfig, backend: Arc<dyn CompletionBackend>) -> Self {
        let classifier = ExternalClassifier::new(
            backend,
            config.taxonomy.clone(),
            config.aliases.clone(),
            config.retry.clone(),
            config.classifier.confidence_floor,
        );
        Self {
            pool,
            config,
            rules: RuleClassifier::new(),
            classifier,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the delay mechanism for retries and inter-batch pauses
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.classifier = self.classifier.with_sleeper(sleeper.clone());
        self.sleeper = sleeper;
        self
    }

    pub fn with_rules(mut self, rules: RuleClassifier) -> Self {
        self.rules = rules;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Start a new run
    pub async fn run(&self, request: RunRequest, cancel: CancellationToken) -> PipelineResult<RunReport> {
        let tiers = self.resolve_tiers(request.tiers.as_deref())?;
        let budget = request.budget_ceiling.or(self.config.budget_ceiling);
        let target = request.target_coverage.unwrap_or(self.config.target_coverage);

        // Sentinel mains are really unclassified; clear them so they are picked up
        let repairer = ConsistencyRepairer::new(
            self.pool.clone(),
            self.config.taxonomy.clone(),
            self.config.repair.clone(),
        );
        let sentinels = repairer.repair_sentinels().await?;
        if sentinels.changed > 0 {
            info!(changed = sentinels.changed, "Cleared sentinel values before run");
        }

        let mut run = PipelineRun::new(tiers, budget, target);
        runs::save_run(&self.pool, &run).await?;
        info!(
            run_id = %run.run_id,
            tiers = ?run.tiers,
            budget_ceiling = ?run.budget_ceiling,
            target_coverage = run.target_coverage,
            "Pipeline run started"
        );

        self.drive(&mut run, &cancel).await
    }

    /// Continue a paused run
    pub async fn resume(&self, token: &str, cancel: CancellationToken) -> PipelineResult<RunReport> {
        let mut run = runs::find_by_resume_token(&self.pool, token)
            .await?
            .ok_or_else(|| PipelineError::InvalidResumeToken(token.to_string()))?;

        for tier in &run.tiers {
            if self.config.tier(tier).is_none() {
                return Err(PipelineError::UnknownTier(tier.clone()));
            }
        }

        let transition = run.resume();
        runs::save_run(&self.pool, &run).await?;
        info!(
            run_id = %run.run_id,
            from = %transition.old_status,
            tier = ?run.current_tier_name(),
            "Pipeline run resumed"
        );

        self.drive(&mut run, &cancel).await
    }

    /// Close a paused run without further processing
    pub async fn abandon(&self, token: &str) -> PipelineResult<PipelineRun> {
        let mut run = runs::find_by_resume_token(&self.pool, token)
            .await?
            .ok_or_else(|| PipelineError::InvalidResumeToken(token.to_string()))?;
        run.transition_to(RunStatus::Abandoned);
        runs::save_run(&self.pool, &run).await?;
        info!(run_id = %run.run_id, tier = ?run.current_tier_name(), "Pipeline run abandoned");
        Ok(run)
    }

    /// Requested tiers in processing order (highest usage first)
    fn resolve_tiers(&self, requested: Option<&[String]>) -> PipelineResult<Vec<String>> {
        let Some(requested) = requested.filter(|r| !r.is_empty()) else {
            return Ok(self.config.tier_names());
        };
        for name in requested {
            if self.config.tier(name).is_none() {
                return Err(PipelineError::UnknownTier(name.clone()));
            }
        }
        Ok(self
            .config
            .tiers
            .iter()
            .filter(|t| requested.contains(&t.name))
            .map(|t| t.name.clone())
            .collect())
    }

    async fn drive(&self, run: &mut PipelineRun, cancel: &CancellationToken) -> PipelineResult<RunReport> {
        let mut report = RunReport::new(run);
        let mut adjuster = BatchSizeAdjuster::new(self.config.tiers.clone());
        let mut evaluator =
            CheckpointEvaluator::new(self.pool.clone(), run.target_coverage, self.config.ratings);

        while let Some(tier_name) = run.current_tier_name().map(str::to_string) {
            if cancel.is_cancelled() {
                return self.finish(run, report, &adjuster, RunStatus::Cancelled, Some(tier_name)).await;
            }

            let profile = self
                .config
                .tier(&tier_name)
                .cloned()
                .ok_or_else(|| PipelineError::UnknownTier(tier_name.clone()))?;
            info!(run_id = %run.run_id, tier = %tier_name, phase = %Phase::SelectTier, "Entering tier");

            let stats = self.rule_pass(&profile).await?;
            report.rule_stats.merge(&stats);

            let end = self
                .external_pass(run, &profile, &mut adjuster, &mut evaluator, cancel, &mut report)
                .await?;

            match end {
                TierEnd::Completed => {
                    info!(run_id = %run.run_id, tier = %tier_name, "Tier complete");
                    run.current_tier += 1;
                    run.updated_at = chrono::Utc::now();
                    runs::save_run(&self.pool, run).await?;
                }
                TierEnd::Paused(checkpoint) => {
                    let token = run.pause(checkpoint);
                    runs::save_run(&self.pool, run).await?;
                    warn!(
                        run_id = %run.run_id,
                        tier = %tier_name,
                        resume_token = %token,
                        "Run paused at checkpoint; resume or abandon with the token"
                    );
                    report.status = run.status;
                    report.resume_token = Some(token);
                    report.spent_cost = run.spent_cost;
                    report.adjustments = adjuster.summary();
                    report.halted_tier = Some(tier_name);
                    return Ok(report);
                }
                TierEnd::BudgetExhausted => {
                    return self
                        .finish(run, report, &adjuster, RunStatus::BudgetExhausted, Some(tier_name))
                        .await;
                }
                TierEnd::Cancelled => {
                    return self.finish(run, report, &adjuster, RunStatus::Cancelled, Some(tier_name)).await;
                }
            }
        }

        info!(run_id = %run.run_id, phase = %Phase::Done, spent_cost = run.spent_cost, "All tiers processed");
        self.finish(run, report, &adjuster, RunStatus::Completed, None).await
    }

    async fn finish(
        &self,
        run: &mut PipelineRun,
        mut report: RunReport,
        adjuster: &BatchSizeAdjuster,
        status: RunStatus,
        halted_tier: Option<String>,
    ) -> PipelineResult<RunReport> {
        run.transition_to(status);
        runs::save_run(&self.pool, run).await?;
        if status != RunStatus::Completed {
            warn!(run_id = %run.run_id, status = %status, tier = ?halted_tier, "Run halted");
        }
        report.status = status;
        report.spent_cost = run.spent_cost;
        report.adjustments = adjuster.summary();
        report.halted_tier = halted_tier;
        Ok(report)
    }

    /// Classify what the rule engine can in one tier
    async fn rule_pass(&self, tier: &TierProfile) -> PipelineResult<RuleStats> {
        let source = format!("rule_engine:{}", tier.name);
        let mut stats = RuleStats::default();
        let mut cursor: Option<UsageCursor> = None;

        loop {
            let page = labels::fetch_unclassified(
                &self.pool,
                tier.min_count,
                tier.max_count,
                cursor.as_ref(),
                self.config.rule_page_size,
            )
            .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(UsageCursor::from(last));

            for label in &page {
                let decision = self.rules.decide(&label.name, label.origin());
                stats.record(decision.as_ref());
                let Some(decision) = decision else {
                    continue;
                };

                let (confidence, reasoning) = if decision.from_origin {
                    (self.config.origin_confidence, "upstream origin category")
                } else {
                    (self.config.rule_confidence, "keyword rule match")
                };
                let assignment = Assignment {
                    main: decision.main,
                    sub: decision.sub,
                    source: &source,
                    confidence,
                    reasoning: Some(reasoning),
                };
                labels::record_classification(&self.pool, &label.name, &assignment).await?;
                debug!(label = %label.name, main = %decision.main, sub = ?decision.sub, "Rule match");
            }
        }

        info!(
            tier = %tier.name,
            phase = %Phase::RulePass,
            classified = stats.classified,
            abstained = stats.abstained,
            from_origin = stats.from_origin,
            coverage = stats.coverage_percent(),
            "Rule pass complete"
        );
        Ok(stats)
    }

    /// Snapshot of the labels left after the rule pass
    async fn remaining(&self, tier: &TierProfile) -> PipelineResult<Vec<Label>> {
        let mut out = Vec::new();
        let mut cursor: Option<UsageCursor> = None;
        loop {
            let page = labels::fetch_unclassified(
                &self.pool,
                tier.min_count,
                tier.max_count,
                cursor.as_ref(),
                self.config.rule_page_size,
            )
            .await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(UsageCursor::from(last));
            out.extend(page);
        }
        Ok(out)
    }

    async fn external_pass(
        &self,
        run: &mut PipelineRun,
        tier: &TierProfile,
        adjuster: &mut BatchSizeAdjuster,
        evaluator: &mut CheckpointEvaluator,
        cancel: &CancellationToken,
        report: &mut RunReport,
    ) -> PipelineResult<TierEnd> {
        let pending = self.remaining(tier).await?;
        if pending.is_empty() {
            debug!(tier = %tier.name, "Nothing left for the external classifier");
            return Ok(TierEnd::Completed);
        }

        let params = adjuster.get_recommended_params(&tier.name);
        let policy = self.config.retry.with_max_attempts(params.retry_count);
        let source = format!("external:{}", tier.name);
        let mut batch_size = params.batch_size;
        let mut recent: VecDeque<f64> = VecDeque::with_capacity(self.config.rolling_window);
        let mut window = Window::default();
        let mut offset = 0;

        info!(
            tier = %tier.name,
            phase = %Phase::ExternalPass,
            labels = pending.len(),
            batch_size,
            retry_count = params.retry_count,
            confidence_floor = params.confidence_floor,
            "External pass starting"
        );

        while offset < pending.len() {
            if cancel.is_cancelled() {
                info!(tier = %tier.name, remaining = pending.len() - offset, "Cancellation requested");
                self.flush(run, evaluator, &mut window, &format!("{} (cancelled)", tier.name), report)
                    .await?;
                return Ok(TierEnd::Cancelled);
            }

            let end = (offset + batch_size.max(1)).min(pending.len());
            let batch = &pending[offset..end];

            let estimate = self.config.request_cost(batch.len());
            if run.would_exceed_budget(estimate) {
                warn!(
                    tier = %tier.name,
                    spent = run.spent_cost,
                    estimate,
                    ceiling = ?run.budget_ceiling,
                    "Budget ceiling reached"
                );
                self.flush(run, evaluator, &mut window, &format!("{} (budget)", tier.name), report)
                    .await?;
                return Ok(TierEnd::BudgetExhausted);
            }

            report.batches += 1;
            let names: Vec<String> = batch.iter().map(|l| l.name.clone()).collect();
            let outcome = self.classifier.classify_batch_with(&names, &policy).await;

            let cost = if outcome.attempts == 0 {
                0.0
            } else {
                self.config.cost_per_request * outcome.attempts as f64
                    + self.config.cost_per_label * batch.len() as f64
            };
            run.spent_cost += cost;

            let mut accepted = 0u64;
            for result in &outcome.results {
                let Some(main) = result.main_category.filter(|_| result.success) else {
                    continue;
                };
                if result.confidence < params.confidence_floor {
                    debug!(
                        label = %result.name,
                        confidence = result.confidence,
                        floor = params.confidence_floor,
                        "Rejected below tier confidence floor"
                    );
                    continue;
                }
                let assignment = Assignment {
                    main,
                    sub: result.sub_category.as_deref(),
                    source: &source,
                    confidence: result.confidence,
                    reasoning: result.reasoning.as_deref(),
                };
                if !labels::record_classification(&self.pool, &result.name, &assignment).await? {
                    debug!(label = %result.name, "Label was classified elsewhere, keeping existing value");
                }
                accepted += 1;
                window.confidences.push(result.confidence);
            }

            let processed = batch.len() as u64;
            window.processed += processed;
            window.succeeded += accepted;
            report.external_processed += processed;
            report.external_succeeded += accepted;

            let batch_rate = accepted as f64 / processed as f64;
            if recent.len() == self.config.rolling_window {
                recent.pop_front();
            }
            recent.push_back(batch_rate);
            let rolling = recent.iter().sum::<f64>() / recent.len() as f64;

            if outcome.exhausted {
                error!(tier = %tier.name, batch = report.batches, labels = processed, "Batch failed, labels left for a later run");
            }
            info!(
                tier = %tier.name,
                batch = report.batches,
                labels = processed,
                accepted,
                attempts = outcome.attempts,
                success_rate = rolling,
                cost,
                spent = run.spent_cost,
                "Batch complete"
            );

            batch_size = adjuster.adjust(rolling, &tier.name, batch_size);
            offset = end;
            run.updated_at = chrono::Utc::now();
            runs::save_run(&self.pool, run).await?;

            if window.processed >= self.config.checkpoint_interval as u64 {
                let checkpoint = self.flush(run, evaluator, &mut window, &tier.name, report).await?;
                if let Some(checkpoint) = checkpoint.filter(|c| self.should_pause(c)) {
                    return Ok(TierEnd::Paused(checkpoint));
                }
            }

            if offset < pending.len() {
                self.sleeper.sleep(params.inter_batch_delay).await;
            }
        }

        let phase = format!("{} (tier end)", tier.name);
        let checkpoint = self.flush(run, evaluator, &mut window, &phase, report).await?;
        if let Some(checkpoint) = checkpoint.filter(|c| self.should_pause(c)) {
            return Ok(TierEnd::Paused(checkpoint));
        }
        Ok(TierEnd::Completed)
    }

    fn should_pause(&self, checkpoint: &Checkpoint) -> bool {
        checkpoint.success_rating == Rating::Warning
            || (self.config.pause_on_confidence_warning && checkpoint.confidence_rating == Rating::Warning)
    }

    /// Evaluate and persist a checkpoint for the current window, if it has anything
    async fn flush(
        &self,
        run: &mut PipelineRun,
        evaluator: &mut CheckpointEvaluator,
        window: &mut Window,
        phase: &str,
        report: &mut RunReport,
    ) -> PipelineResult<Option<Checkpoint>> {
        if window.is_empty() {
            return Ok(None);
        }
        let current = std::mem::take(window);
        let checkpoint = evaluator
            .evaluate(current.processed, current.succeeded, &current.confidences, phase)
            .await?;
        checkpoints::insert_checkpoint(&self.pool, Some(run.run_id), &checkpoint).await?;
        run.last_checkpoint = Some(checkpoint.clone());
        runs::save_run(&self.pool, run).await?;
        debug!(phase = %Phase::Checkpoint, tier = %phase, "Checkpoint stored");
        report.checkpoints.push(checkpoint.clone());
        Ok(Some(checkpoint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassifierError;
    use async_trait::async_trait;
    use pstag_common::db::{NewLabel, OriginCategory};
    use sqlx::sqlite::SqlitePoolOptions;

    struct Unreachable;

    #[async_trait]
    impl CompletionBackend for Unreachable {
        async fn complete(&self, _prompt: &str) -> Result<String, ClassifierError> {
            Err(ClassifierError::Transport("offline".into()))
        }
    }

    async fn orchestrator() -> Orchestrator {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pstag_common::db::create_schema(&pool).await.unwrap();
        Orchestrator::new(pool, PipelineConfig::default(), Arc::new(Unreachable))
    }

    #[tokio::test]
    async fn test_resolve_tiers_orders_by_usage() {
        let orchestrator = orchestrator().await;
        let tiers = orchestrator
            .resolve_tiers(Some(&["<1K".to_string(), "100K+".to_string()]))
            .unwrap();
        assert_eq!(tiers, vec!["100K+", "<1K"]);
        assert_eq!(orchestrator.resolve_tiers(None).unwrap().len(), 9);
        assert!(matches!(
            orchestrator.resolve_tiers(Some(&["nope".to_string()])),
            Err(PipelineError::UnknownTier(_))
        ));
    }

    #[tokio::test]
    async fn test_rule_pass_records_source_and_confidence() {
        let orchestrator = orchestrator().await;
        labels::import_labels(
            &orchestrator.pool,
            &[
                NewLabel::new("1girl", OriginCategory::General, 500),
                NewLabel::new("some_artist", OriginCategory::Artist, 400),
                NewLabel::new("zzz_unrecognized_000", OriginCategory::General, 300),
            ],
        )
        .await
        .unwrap();

        let tier = orchestrator.config.tier("<1K").unwrap().clone();
        let stats = orchestrator.rule_pass(&tier).await.unwrap();
        assert_eq!(stats.classified, 2);
        assert_eq!(stats.abstained, 1);

        let girl = labels::get_label(&orchestrator.pool, "1girl").await.unwrap().unwrap();
        assert_eq!(girl.main_category.as_deref(), Some("CHARACTER_RELATED"));
        assert_eq!(girl.sub_category.as_deref(), Some("CHARACTER_COUNT"));
        assert_eq!(girl.classification_source.as_deref(), Some("rule_engine:<1K"));
        assert_eq!(girl.confidence, Some(0.90));

        let artist = labels::get_label(&orchestrator.pool, "some_artist").await.unwrap().unwrap();
        assert_eq!(artist.main_category.as_deref(), Some("ARTIST"));
        assert_eq!(artist.confidence, Some(1.0));
    }
}
