//! Pipeline configuration
//!
//! Assembled once from the TOML file (plus the resolved API key) and passed
//! explicitly to every component. Nothing in the pipeline reads the
//! environment or global state after this point.

use crate::batch_adjuster::{tiers_from_config, TierProfile};
use crate::checkpoint::RatingThresholds;
use crate::error::{PipelineError, PipelineResult};
use crate::external::{AliasTable, RetryPolicy};
use crate::repair::RepairSettings;
use pstag_common::config::{ClassifierSection, TomlConfig};
use pstag_common::Taxonomy;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub taxonomy: Taxonomy,
    pub classifier: ClassifierSection,
    /// Only required by commands that reach the external classifier
    pub api_key: Option<String>,
    pub retry: RetryPolicy,
    pub aliases: AliasTable,
    /// Processing order: highest usage band first
    pub tiers: Vec<TierProfile>,
    pub checkpoint_interval: usize,
    pub target_coverage: f64,
    /// Checked before each batch against a single-attempt estimate; retries
    /// inside that batch can overshoot it by up to
    /// `(max_attempts - 1) * cost_per_request`.
    pub budget_ceiling: Option<f64>,
    pub cost_per_request: f64,
    pub cost_per_label: f64,
    pub rule_confidence: f64,
    pub origin_confidence: f64,
    pub pause_on_confidence_warning: bool,
    pub rolling_window: usize,
    pub rule_page_size: i64,
    pub ratings: RatingThresholds,
    pub repair: RepairSettings,
}

impl PipelineConfig {
    pub fn from_toml(config: &TomlConfig, api_key: Option<String>) -> PipelineResult<Self> {
        let taxonomy = Taxonomy::standard();

        let mut aliases = AliasTable::standard();
        aliases
            .extend_from_config(&config.aliases, &taxonomy)
            .map_err(PipelineError::Config)?;

        let mut tiers = tiers_from_config(&config.tiers);
        tiers.sort_by(|a, b| b.min_count.cmp(&a.min_count));

        let repair = RepairSettings::from_section(&config.repair, &taxonomy)?;
        let pipeline = &config.pipeline;

        let built = Self {
            taxonomy,
            classifier: config.classifier.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            retry: RetryPolicy::from_section(&config.retry),
            aliases,
            tiers,
            checkpoint_interval: pipeline.checkpoint_interval,
            target_coverage: pipeline.target_coverage,
            budget_ceiling: pipeline.budget_ceiling,
            cost_per_request: pipeline.cost_per_request,
            cost_per_label: pipeline.cost_per_label,
            rule_confidence: pipeline.rule_confidence,
            origin_confidence: pipeline.origin_confidence,
            pause_on_confidence_warning: pipeline.pause_on_confidence_warning,
            rolling_window: pipeline.rolling_window,
            rule_page_size: pipeline.rule_page_size,
            ratings: RatingThresholds::from_section(&config.ratings),
            repair,
        };
        built.validate()?;
        Ok(built)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        let unit = |name: &str, value: f64| -> PipelineResult<()> {
            if (0.0..=1.0).contains(&value) {
                Ok(())
            } else {
                Err(PipelineError::Config(format!("{} must be within [0, 1], got {}", name, value)))
            }
        };

        unit("classifier.confidence_floor", self.classifier.confidence_floor)?;
        unit("pipeline.rule_confidence", self.rule_confidence)?;
        unit("pipeline.origin_confidence", self.origin_confidence)?;
        unit("repair.low_confidence_floor", self.repair.low_confidence_floor)?;
        unit("ratings.success_excellent", self.ratings.success_excellent)?;
        unit("ratings.success_good", self.ratings.success_good)?;
        unit("ratings.confidence_excellent", self.ratings.confidence_excellent)?;
        unit("ratings.confidence_good", self.ratings.confidence_good)?;

        if self.checkpoint_interval == 0 {
            return Err(PipelineError::Config("pipeline.checkpoint_interval must be positive".into()));
        }
        if self.rolling_window == 0 {
            return Err(PipelineError::Config("pipeline.rolling_window must be positive".into()));
        }
        if self.rule_page_size <= 0 {
            return Err(PipelineError::Config("pipeline.rule_page_size must be positive".into()));
        }
        if !(self.target_coverage > 0.0 && self.target_coverage <= 100.0) {
            return Err(PipelineError::Config(format!(
                "pipeline.target_coverage must be within (0, 100], got {}",
                self.target_coverage
            )));
        }
        if let Some(ceiling) = self.budget_ceiling {
            if ceiling < 0.0 {
                return Err(PipelineError::Config("pipeline.budget_ceiling must not be negative".into()));
            }
        }
        if self.cost_per_request < 0.0 || self.cost_per_label < 0.0 {
            return Err(PipelineError::Config("pipeline costs must not be negative".into()));
        }

        if self.tiers.is_empty() {
            return Err(PipelineError::Config("at least one tier is required".into()));
        }
        let mut names = HashSet::new();
        for tier in &self.tiers {
            if !names.insert(tier.name.as_str()) {
                return Err(PipelineError::Config(format!("duplicate tier '{}'", tier.name)));
            }
            if tier.min_batch_size == 0 || tier.min_batch_size > tier.max_batch_size {
                return Err(PipelineError::Config(format!(
                    "tier '{}': batch bounds {}..={} are invalid",
                    tier.name, tier.min_batch_size, tier.max_batch_size
                )));
            }
            if tier.max_count.map_or(false, |max| max <= tier.min_count) {
                return Err(PipelineError::Config(format!(
                    "tier '{}': max_count must exceed min_count",
                    tier.name
                )));
            }
            unit("tier confidence_floor", tier.confidence_floor)?;
        }
        Ok(())
    }

    pub fn tier(&self, name: &str) -> Option<&TierProfile> {
        self.tiers.iter().find(|t| t.name == name)
    }

    pub fn tier_names(&self) -> Vec<String> {
        self.tiers.iter().map(|t| t.name.clone()).collect()
    }

    /// Estimated cost of one request covering `labels` labels
    pub fn request_cost(&self, labels: usize) -> f64 {
        self.cost_per_request + self.cost_per_label * labels as f64
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let taxonomy = Taxonomy::standard();
        let pipeline = pstag_common::config::PipelineSection::default();
        Self {
            taxonomy,
            classifier: ClassifierSection::default(),
            api_key: None,
            retry: RetryPolicy::default(),
            aliases: AliasTable::standard(),
            tiers: crate::batch_adjuster::standard_tiers(),
            checkpoint_interval: pipeline.checkpoint_interval,
            target_coverage: pipeline.target_coverage,
            budget_ceiling: pipeline.budget_ceiling,
            cost_per_request: pipeline.cost_per_request,
            cost_per_label: pipeline.cost_per_label,
            rule_confidence: pipeline.rule_confidence,
            origin_confidence: pipeline.origin_confidence,
            pause_on_confidence_warning: pipeline.pause_on_confidence_warning,
            rolling_window: pipeline.rolling_window,
            rule_page_size: pipeline.rule_page_size,
            ratings: RatingThresholds::default(),
            repair: RepairSettings::default(),
        }
    }
}
