//! End-to-end pipeline runs against an in-memory label store
//!
//! The external classifier is replaced by a scripted backend; delays go
//! through a recording sleeper so no test waits on real time.

mod helpers;

use helpers::backend::reply_for;
use helpers::*;
use pstag_classify::batch_adjuster::TierProfile;
use pstag_classify::checkpoint::Rating;
use pstag_classify::db::{checkpoints, labels, runs};
use pstag_classify::external::{AliasTable, CompletionBackend, ExternalClassifier, RetryPolicy};
use pstag_classify::models::RunStatus;
use pstag_classify::{ClassifierError, Orchestrator, PipelineConfig, PipelineError, RunRequest};
use pstag_common::Taxonomy;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Single catch-all tier with fixed batches of 10
fn test_config() -> PipelineConfig {
    let mut tier = TierProfile::fallback("all");
    tier.min_count = 0;
    tier.max_count = None;
    tier.confidence_floor = 0.60;
    tier.inter_batch_delay = Duration::ZERO;

    let mut config = PipelineConfig::default();
    config.tiers = vec![tier];
    config.cost_per_request = 0.01;
    config.cost_per_label = 0.0;
    config
}

fn unrecognized(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("zzz_unrecognized_{:03}", i)).collect()
}

async fn seed_unrecognized(pool: &SqlitePool, names: &[String]) {
    let rows: Vec<(&str, i64, i64)> = names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), 0, 900 - i as i64))
        .collect();
    seed_labels(pool, &rows).await;
}

fn confident_objects(_label: &str) -> (String, Option<String>, f64) {
    ("OBJECTS".to_string(), Some("MISCELLANEOUS".to_string()), 0.97)
}

fn build(pool: &SqlitePool, config: PipelineConfig, backend: Arc<ScriptedBackend>) -> (Orchestrator, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let orchestrator = Orchestrator::new(pool.clone(), config, backend).with_sleeper(sleeper.clone());
    (orchestrator, sleeper)
}

#[tokio::test]
async fn test_malformed_replies_are_retried() {
    let labels = unrecognized(3);
    let backend = Arc::new(
        ScriptedBackend::answering(confident_objects)
            .then_reply("I'm sorry, here are the results: ...")
            .then_reply(r#"{"classifications": [{"tag": "zzz_unrecognized_001""#),
    );
    let sleeper = Arc::new(RecordingSleeper::default());
    let classifier = ExternalClassifier::new(
        backend.clone(),
        Taxonomy::standard(),
        AliasTable::standard(),
        RetryPolicy::new(3, Duration::from_millis(100)),
        0.5,
    )
    .with_sleeper(sleeper.clone());

    let results = classifier.classify_batch(&labels).await;

    assert_eq!(backend.calls(), 3);
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.success));
    assert_eq!(
        results.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
        labels.iter().map(String::as_str).collect::<Vec<_>>()
    );

    let delays = sleeper.delays();
    assert_eq!(delays.len(), 2);
    assert!(delays[0] >= Duration::from_millis(100));
    assert!(delays[1] >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_client_error_is_not_retried() {
    let labels = unrecognized(2);
    let backend = Arc::new(ScriptedBackend::answering(confident_objects).then_fail(ClassifierError::Api {
        status: 401,
        body: "unauthorized".into(),
    }));
    let classifier = ExternalClassifier::new(
        backend.clone(),
        Taxonomy::standard(),
        AliasTable::standard(),
        RetryPolicy::new(5, Duration::from_millis(10)),
        0.5,
    )
    .with_sleeper(Arc::new(RecordingSleeper::default()));

    let outcome = classifier.classify_batch_with(&labels, classifier.retry_policy()).await;

    assert_eq!(backend.calls(), 1);
    assert!(outcome.exhausted);
    assert_eq!(outcome.succeeded(), 0);
    assert!(outcome.results.iter().all(|r| r.error.is_some()));
}

#[tokio::test]
async fn test_full_run_classifies_every_label() {
    let pool = create_test_pool().await;
    seed_labels(&pool, &[("1girl", 0, 5000), ("some_artist", 1, 4000), ("long_hair", 0, 3000)]).await;
    let external = unrecognized(5);
    seed_unrecognized(&pool, &external).await;

    let backend = Arc::new(ScriptedBackend::answering(confident_objects));
    let (orchestrator, _) = build(&pool, test_config(), backend.clone());
    let report = orchestrator
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert!(report.resume_token.is_none());
    assert_eq!(report.external_processed, 5);
    assert_eq!(report.external_succeeded, 5);
    assert_eq!(report.rule_stats.classified, 3);
    assert_eq!(backend.calls(), 1);
    assert_eq!(backend.requested()[0], external);

    let taxonomy = Taxonomy::standard();
    for label in all_labels(&pool).await {
        let main = label.main_category.as_deref().expect("every label classified");
        assert!(
            taxonomy.is_valid_assignment(main, label.sub_category.as_deref()),
            "{} has {}/{:?}",
            label.name,
            main,
            label.sub_category
        );
        let source = label.classification_source.unwrap();
        if label.name.starts_with("zzz_") {
            assert_eq!(source, "external:all");
            assert_eq!(label.confidence, Some(0.97));
        } else {
            assert_eq!(source, "rule_engine:all");
        }
    }

    let coverage = labels::coverage(&pool).await.unwrap();
    assert_eq!(coverage.classified, 8);
    assert_eq!(coverage.percent(), 100.0);

    let stored = runs::load_run(&pool, report.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Completed);
    assert!(stored.ended_at.is_some());
    assert!((stored.spent_cost - 0.01).abs() < 1e-9);
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let pool = create_test_pool().await;
    seed_labels(&pool, &[("1girl", 0, 5000)]).await;
    seed_unrecognized(&pool, &unrecognized(4)).await;

    let backend = Arc::new(ScriptedBackend::answering(confident_objects));
    let (orchestrator, _) = build(&pool, test_config(), backend.clone());
    orchestrator
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();
    let before = all_labels(&pool).await;

    let report = orchestrator
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.rule_stats.classified, 0);
    assert_eq!(report.external_processed, 0);
    assert!(report.checkpoints.is_empty());
    assert_eq!(backend.calls(), 1);
    assert_eq!(all_labels(&pool).await, before);
}

#[tokio::test]
async fn test_low_success_pauses_then_resumes() {
    let pool = create_test_pool().await;
    let names = unrecognized(10);
    seed_unrecognized(&pool, &names).await;

    // Two of ten come back with a category outside the taxonomy: 80% success
    let backend = Arc::new(ScriptedBackend::answering(|label: &str| {
        if label.ends_with("_009") || label.ends_with("_010") {
            ("BOGUS".to_string(), None, 0.9)
        } else {
            confident_objects(label)
        }
    }));
    let (first, _) = build(&pool, test_config(), backend);
    let report = first
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Paused);
    assert_eq!(report.external_succeeded, 8);
    assert_eq!(report.halted_tier.as_deref(), Some("all"));
    let token = report.resume_token.clone().expect("paused run has a token");

    let checkpoint = report.checkpoints.last().unwrap();
    assert!((checkpoint.success_rate - 0.8).abs() < 1e-9);
    assert_eq!(checkpoint.success_rating, Rating::Warning);
    assert_eq!(labels::coverage(&pool).await.unwrap().classified, 8);

    let paused = runs::find_by_resume_token(&pool, &token).await.unwrap().unwrap();
    assert_eq!(paused.run_id, report.run_id);
    assert_eq!(paused.status, RunStatus::Paused);

    // A later process resumes with a healthy backend
    let backend = Arc::new(ScriptedBackend::answering(confident_objects));
    let (second, _) = build(&pool, test_config(), backend.clone());
    let resumed = second.resume(&token, CancellationToken::new()).await.unwrap();

    assert_eq!(resumed.run_id, report.run_id);
    assert_eq!(resumed.status, RunStatus::Completed);
    assert_eq!(backend.requested(), vec![names[8..].to_vec()]);
    assert_eq!(labels::coverage(&pool).await.unwrap().classified, 10);

    assert!(matches!(
        second.resume(&token, CancellationToken::new()).await,
        Err(PipelineError::InvalidResumeToken(_))
    ));

    let history = checkpoints::list_checkpoints(&pool, Some(report.run_id)).await.unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_abandon_closes_paused_run() {
    let pool = create_test_pool().await;
    seed_unrecognized(&pool, &unrecognized(10)).await;

    let backend = Arc::new(ScriptedBackend::answering(|_: &str| ("BOGUS".to_string(), None, 0.9)));
    let (orchestrator, _) = build(&pool, test_config(), backend);
    let report = orchestrator
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();
    let token = report.resume_token.unwrap();

    let run = orchestrator.abandon(&token).await.unwrap();
    assert_eq!(run.status, RunStatus::Abandoned);
    assert!(run.resume_token.is_none());
    assert!(run.ended_at.is_some());

    let stored = runs::load_run(&pool, report.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Abandoned);
    assert!(matches!(
        orchestrator.abandon(&token).await,
        Err(PipelineError::InvalidResumeToken(_))
    ));
    assert_eq!(labels::coverage(&pool).await.unwrap().classified, 0);
}

#[tokio::test]
async fn test_budget_ceiling_halts_before_crossing() {
    let pool = create_test_pool().await;
    seed_unrecognized(&pool, &unrecognized(30)).await;

    let backend = Arc::new(ScriptedBackend::answering(confident_objects));
    let (orchestrator, _) = build(&pool, test_config(), backend.clone());
    let request = RunRequest {
        budget_ceiling: Some(0.025),
        ..Default::default()
    };
    let report = orchestrator.run(request, CancellationToken::new()).await.unwrap();

    assert_eq!(report.status, RunStatus::BudgetExhausted);
    assert_eq!(backend.calls(), 2);
    assert_eq!(report.batches, 2);
    assert!(report.spent_cost <= 0.025);
    assert_eq!(labels::coverage(&pool).await.unwrap().classified, 20);

    let stored = runs::load_run(&pool, report.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::BudgetExhausted);
    assert!(stored.resume_token.is_none());
}

#[tokio::test]
async fn test_retries_overshoot_budget_by_at_most_extra_attempts() {
    let pool = create_test_pool().await;
    seed_unrecognized(&pool, &unrecognized(20)).await;

    let mut config = test_config();
    config.tiers[0].retry_count = 3;
    let backend = Arc::new(
        ScriptedBackend::answering(confident_objects)
            .then_fail(ClassifierError::Transport("connection reset".into()))
            .then_fail(ClassifierError::Transport("connection reset".into())),
    );
    let (orchestrator, _) = build(&pool, config, backend.clone());
    let request = RunRequest {
        budget_ceiling: Some(0.015),
        ..Default::default()
    };
    let report = orchestrator.run(request, CancellationToken::new()).await.unwrap();

    assert_eq!(report.status, RunStatus::BudgetExhausted);
    assert_eq!(report.batches, 1);
    assert_eq!(backend.calls(), 3);
    assert!((report.spent_cost - 0.03).abs() < 1e-9);
    assert!(report.spent_cost <= 0.015 + 2.0 * 0.01 + 1e-9);
    assert_eq!(labels::coverage(&pool).await.unwrap().classified, 10);
}

#[tokio::test]
async fn test_exhausted_batch_does_not_abort_run() {
    let pool = create_test_pool().await;
    let names = unrecognized(20);
    seed_unrecognized(&pool, &names).await;

    // Fallback tier allows two attempts, both of which fail for the first batch
    let backend = Arc::new(
        ScriptedBackend::answering(confident_objects)
            .then_fail(ClassifierError::Transport("connection reset".into()))
            .then_fail(ClassifierError::Transport("connection reset".into())),
    );
    let (orchestrator, _) = build(&pool, test_config(), backend.clone());
    let report = orchestrator
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(backend.calls(), 3);
    assert_eq!(report.batches, 2);
    assert_eq!(report.external_processed, 20);
    assert_eq!(report.external_succeeded, 10);
    assert_eq!(backend.requested().last().unwrap(), &names[10..].to_vec());

    for name in &names[..10] {
        let label = fetch_label(&pool, name).await;
        assert!(label.main_category.is_none(), "{} should be untouched", name);
        assert!(label.classification_source.is_none());
    }
    for name in &names[10..] {
        assert_eq!(fetch_label(&pool, name).await.main_category.as_deref(), Some("OBJECTS"));
    }

    let checkpoint = report.checkpoints.last().expect("tier-end checkpoint");
    assert_eq!(checkpoint.processed, 20);
    assert!((checkpoint.success_rate - 0.5).abs() < 1e-9);
    assert_eq!(checkpoint.success_rating, Rating::Warning);
    assert_eq!(report.status, RunStatus::Paused);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let pool = create_test_pool().await;
    seed_unrecognized(&pool, &unrecognized(5)).await;

    let backend = Arc::new(ScriptedBackend::answering(confident_objects));
    let (orchestrator, _) = build(&pool, test_config(), backend.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let report = orchestrator.run(RunRequest::default(), cancel).await.unwrap();

    assert_eq!(report.status, RunStatus::Cancelled);
    assert_eq!(backend.calls(), 0);
    let stored = runs::load_run(&pool, report.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Cancelled);
}

#[tokio::test]
async fn test_checkpoints_every_interval_and_tier_end() {
    let pool = create_test_pool().await;
    seed_unrecognized(&pool, &unrecognized(25)).await;

    let mut config = test_config();
    config.checkpoint_interval = 10;
    config.tiers[0].inter_batch_delay = Duration::from_millis(5);

    let backend = Arc::new(ScriptedBackend::answering(confident_objects));
    let (orchestrator, sleeper) = build(&pool, config, backend);
    let report = orchestrator
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.batches, 3);
    assert_eq!(
        report.checkpoints.iter().map(|c| c.processed).collect::<Vec<_>>(),
        vec![10, 10, 5]
    );
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(5); 2]);

    let stored = checkpoints::list_checkpoints(&pool, Some(report.run_id)).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored.last().unwrap().coverage, 100.0);
}

#[tokio::test]
async fn test_results_below_tier_floor_are_left_unclassified() {
    let pool = create_test_pool().await;
    seed_unrecognized(&pool, &unrecognized(10)).await;

    let backend = Arc::new(ScriptedBackend::answering(|label: &str| {
        let confidence = if label.ends_with("_001") { 0.40 } else { 0.97 };
        ("OBJECTS".to_string(), None, confidence)
    }));
    let mut config = test_config();
    config.ratings.success_good = 0.85;
    config.ratings.success_excellent = 0.95;
    let (orchestrator, _) = build(&pool, config, backend);
    let report = orchestrator
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.external_succeeded, 9);
    assert!(fetch_label(&pool, "zzz_unrecognized_001").await.main_category.is_none());
    assert_eq!(labels::coverage(&pool).await.unwrap().unclassified(), 1);
}

#[tokio::test]
async fn test_run_clears_sentinel_mains_first() {
    let pool = create_test_pool().await;
    seed_unrecognized(&pool, &unrecognized(1)).await;
    set_classification(&pool, "zzz_unrecognized_001", Some("null"), Some("N/A"), Some("legacy"), None).await;

    let backend = Arc::new(ScriptedBackend::new().then_reply(&reply_for(&[(
        "zzz_unrecognized_001".to_string(),
        "THEME_CONCEPT".to_string(),
        Some("CONCEPT".to_string()),
        0.91,
    )])));
    let (orchestrator, _) = build(&pool, test_config(), backend);
    let report = orchestrator
        .run(RunRequest::default(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.external_succeeded, 1);
    let label = fetch_label(&pool, "zzz_unrecognized_001").await;
    assert_eq!(label.main_category.as_deref(), Some("THEME_CONCEPT"));
    assert_eq!(label.sub_category.as_deref(), Some("CONCEPT"));
    assert_eq!(label.classification_source.as_deref(), Some("external:all"));
}

#[tokio::test]
async fn test_unknown_tier_is_rejected() {
    let pool = create_test_pool().await;
    let backend: Arc<dyn CompletionBackend> = Arc::new(ScriptedBackend::new());
    let orchestrator = Orchestrator::new(pool, test_config(), backend);
    let request = RunRequest {
        tiers: Some(vec!["10K-20K".to_string()]),
        ..Default::default()
    };

    assert!(matches!(
        orchestrator.run(request, CancellationToken::new()).await,
        Err(PipelineError::UnknownTier(name)) if name == "10K-20K"
    ));
}
