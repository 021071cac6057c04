//! pstag-classify - tag vocabulary classification pipeline
//!
//! Commands:
//! - `import` seeds the label store from `name,origin_category,usage_count` rows
//! - `run` / `resume` / `abandon` drive the tier-by-tier pipeline
//! - `repair` runs the consistency passes
//! - `report` / `status` summarize progress
//! - `classify` dry-runs the rule engine on one label

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use pstag_classify::checkpoint::render_report;
use pstag_classify::db::{checkpoints, labels, runs};
use pstag_classify::external::ChatCompletionClient;
use pstag_classify::models::RunStatus;
use pstag_classify::repair::{ConsistencyRepairer, RepairPass};
use pstag_classify::rules::RuleClassifier;
use pstag_classify::{Orchestrator, PipelineConfig, RunReport, RunRequest};
use pstag_common::config::ConfigResolver;
use pstag_common::db::{init_database, OriginCategory};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "pstag-classify")]
#[command(about = "Classify tag vocabularies into a fixed two-level taxonomy")]
#[command(version)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Label store (SQLite)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import labels from a CSV file
    Import {
        /// File with `name,origin_category,usage_count` rows
        file: PathBuf,
    },
    /// Start a new classification run
    Run {
        /// Tier to process (repeatable); defaults to all tiers
        #[arg(long = "tier")]
        tiers: Vec<String>,
        /// Cost ceiling for this run
        #[arg(long)]
        budget: Option<f64>,
        /// Target coverage percentage
        #[arg(long)]
        target_coverage: Option<f64>,
    },
    /// Continue a paused run
    Resume { token: String },
    /// Close a paused run
    Abandon { token: String },
    /// Run consistency repair passes
    Repair {
        #[arg(long, value_enum, default_value = "all")]
        pass: PassArg,
    },
    /// Write the checkpoint progress report
    Report {
        /// Output file; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Only checkpoints of this run
        #[arg(long)]
        run: Option<uuid::Uuid>,
    },
    /// Show coverage and recent runs
    Status,
    /// Show what the rule engine decides for a label
    Classify {
        label: String,
        /// Upstream origin category code (0 general, 1 artist, 3 copyright, 4 character, 5 meta)
        #[arg(long, default_value_t = 0)]
        origin: i64,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PassArg {
    Sentinel,
    Group,
    LowConfidence,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let resolver = ConfigResolver::new(args.config.clone(), args.database.clone());
    let toml = resolver.load().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| toml.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("pstag-classify {}", env!("CARGO_PKG_VERSION"));

    let config = PipelineConfig::from_toml(&toml, resolver.api_key(&toml))
        .context("Invalid configuration")?;

    if let Command::Classify { label, origin } = &args.command {
        return classify_label(label, *origin);
    }

    let db_path = resolver.database_path(&toml);
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open label store {}", db_path.display()))?;

    match args.command {
        Command::Import { file } => import(&pool, &file).await,
        Command::Run {
            tiers,
            budget,
            target_coverage,
        } => {
            let orchestrator = build_orchestrator(pool, config)?;
            let cancel = shutdown_token();
            let request = RunRequest {
                tiers: (!tiers.is_empty()).then_some(tiers),
                budget_ceiling: budget,
                target_coverage,
            };
            let report = orchestrator.run(request, cancel).await?;
            print_run_report(&report);
            Ok(())
        }
        Command::Resume { token } => {
            let orchestrator = build_orchestrator(pool, config)?;
            let report = orchestrator.resume(&token, shutdown_token()).await?;
            print_run_report(&report);
            Ok(())
        }
        Command::Abandon { token } => {
            let orchestrator = build_orchestrator(pool, config)?;
            let run = orchestrator.abandon(&token).await?;
            println!("Run {} abandoned at tier {:?}", run.run_id, run.current_tier_name());
            Ok(())
        }
        Command::Repair { pass } => repair(pool, config, pass).await,
        Command::Report { output, run } => report(&pool, &config, output, run).await,
        Command::Status => status(&pool).await,
        Command::Classify { .. } => Ok(()),
    }
}

fn build_orchestrator(pool: SqlitePool, config: PipelineConfig) -> Result<Orchestrator> {
    let Some(api_key) = config.api_key.clone() else {
        bail!("No API key: set PSTAG_API_KEY or OPENROUTER_API_KEY, or classifier.api_key in the config file");
    };
    let client = ChatCompletionClient::new(&config.classifier, api_key)
        .context("Failed to build external classifier client")?;
    Ok(Orchestrator::new(pool, config, Arc::new(client)))
}

/// Cancel on Ctrl-C; the run stops at the next batch boundary
fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, stopping after the current batch");
            child.cancel();
        }
    });
    token
}

async fn import(pool: &SqlitePool, file: &Path) -> Result<()> {
    let text = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let rows = labels::parse_label_rows(&text)?;
    let written = labels::import_labels(pool, &rows).await?;
    println!("Imported {} labels ({} rows written)", rows.len(), written);
    Ok(())
}

async fn repair(pool: SqlitePool, config: PipelineConfig, pass: PassArg) -> Result<()> {
    let repairer = ConsistencyRepairer::new(pool, config.taxonomy.clone(), config.repair.clone());
    let results = match pass {
        PassArg::All => repairer.run_all().await?,
        PassArg::Sentinel => vec![(RepairPass::Sentinel, repairer.run_pass(RepairPass::Sentinel).await?)],
        PassArg::Group => vec![(RepairPass::Group, repairer.run_pass(RepairPass::Group).await?)],
        PassArg::LowConfidence => vec![(
            RepairPass::LowConfidence,
            repairer.run_pass(RepairPass::LowConfidence).await?,
        )],
    };
    for (pass, outcome) in results {
        println!("{:<15} examined {:>8}  changed {:>6}", pass, outcome.examined, outcome.changed);
    }
    Ok(())
}

async fn report(pool: &SqlitePool, config: &PipelineConfig, output: Option<PathBuf>, run: Option<uuid::Uuid>) -> Result<()> {
    let history = checkpoints::list_checkpoints(pool, run).await?;
    let target = match run {
        Some(id) => runs::load_run(pool, id)
            .await?
            .map_or(config.target_coverage, |r| r.target_coverage),
        None => config.target_coverage,
    };
    let rendered = render_report(&history, target);
    match output {
        Some(path) => {
            tokio::fs::write(&path, rendered)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Report written to {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

async fn status(pool: &SqlitePool) -> Result<()> {
    let coverage = labels::coverage(pool).await?;
    println!(
        "Coverage: {}/{} labels ({:.2}%), {} unclassified, {} flagged ambiguous",
        coverage.classified,
        coverage.total,
        coverage.percent(),
        coverage.unclassified(),
        labels::count_ambiguous(pool).await?
    );
    for (main, count) in labels::category_distribution(pool).await? {
        println!("  {:<18} {:>8}", main, count);
    }

    let recent = runs::list_runs(pool, 5).await?;
    if !recent.is_empty() {
        println!("Recent runs:");
    }
    for run in recent {
        let token = match (&run.status, &run.resume_token) {
            (RunStatus::Paused, Some(token)) => format!(" resume token {}", token),
            _ => String::new(),
        };
        println!(
            "  {} {:<16} tier {:?} spent {:.4}{}",
            run.run_id,
            run.status,
            run.current_tier_name(),
            run.spent_cost,
            token
        );
    }
    Ok(())
}

fn classify_label(label: &str, origin: i64) -> Result<()> {
    let rules = RuleClassifier::new();
    match rules.decide(label, OriginCategory::from_code(origin)) {
        Some(decision) => println!(
            "{} -> {}{}{}",
            label,
            decision.main,
            decision.sub.map(|s| format!("/{}", s)).unwrap_or_default(),
            if decision.from_origin { " (origin category)" } else { "" }
        ),
        None => println!("{} -> no rule matched", label),
    }
    Ok(())
}

fn print_run_report(report: &RunReport) {
    println!("Run {}: {}", report.run_id, report.status);
    println!(
        "  rule engine: {} classified, {} abstained",
        report.rule_stats.classified, report.rule_stats.abstained
    );
    println!(
        "  external: {} accepted of {} in {} batches, cost {:.4}",
        report.external_succeeded, report.external_processed, report.batches, report.spent_cost
    );
    println!(
        "  batch size changes: {} ({} up, {} down)",
        report.adjustments.total, report.adjustments.increases, report.adjustments.decreases
    );
    if let Some(checkpoint) = report.checkpoints.last() {
        println!(
            "  last checkpoint [{}]: success {:.1}% ({}), confidence {} ({}), coverage {:.2}% ({})",
            checkpoint.phase,
            checkpoint.success_rate * 100.0,
            checkpoint.success_rating,
            checkpoint
                .confidence
                .mean
                .map_or_else(|| "-".to_string(), |m| format!("{:.3}", m)),
            checkpoint.confidence_rating,
            checkpoint.coverage,
            checkpoint.coverage_band
        );
    }
    if let Some(tier) = &report.halted_tier {
        println!("  stopped in tier {}", tier);
    }
    if let Some(token) = &report.resume_token {
        println!("  paused: run `pstag-classify resume {}` or `abandon {}`", token, token);
    }
}
