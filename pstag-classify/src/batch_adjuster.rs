//! Adaptive batch sizing per frequency tier
//!
//! Proposes the next external-classifier batch size from the observed success
//! rate. Each tier has three target sizes (small, medium, large) chosen by the
//! tier's good/excellent thresholds; the size moves towards the target by at
//! most +2 or -3 per call and always stays inside the tier's bounds.
//!
//! The adjustment log is kept for reporting only and is never read back as
//! control input.

use chrono::{DateTime, Utc};
use pstag_common::config::TierSection;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Largest growth per adjustment
pub const MAX_INCREASE: usize = 2;
/// Largest shrink per adjustment
pub const MAX_DECREASE: usize = 3;

/// Sizing and quality settings for one usage-count band
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierProfile {
    pub name: String,
    /// Inclusive lower usage bound
    pub min_count: i64,
    /// Exclusive upper usage bound; `None` is unbounded
    pub max_count: Option<i64>,
    pub batch_size: usize,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub small_batch: usize,
    pub medium_batch: usize,
    pub large_batch: usize,
    pub good_threshold: f64,
    pub excellent_threshold: f64,
    pub retry_count: u32,
    pub inter_batch_delay: Duration,
    /// External results below this confidence are rejected
    pub confidence_floor: f64,
}

impl TierProfile {
    #[allow(clippy::too_many_arguments)]
    fn builtin(
        name: &str,
        min_count: i64,
        max_count: Option<i64>,
        sizes: [usize; 6],
        thresholds: (f64, f64),
        retry_count: u32,
        delay_ms: u64,
        confidence_floor: f64,
    ) -> Self {
        let [batch_size, min_batch_size, max_batch_size, small_batch, medium_batch, large_batch] =
            sizes;
        Self {
            name: name.to_string(),
            min_count,
            max_count,
            batch_size,
            min_batch_size,
            max_batch_size,
            small_batch,
            medium_batch,
            large_batch,
            good_threshold: thresholds.0,
            excellent_threshold: thresholds.1,
            retry_count,
            inter_batch_delay: Duration::from_millis(delay_ms),
            confidence_floor,
        }
    }

    /// Conservative settings for tiers without a built-in profile
    pub fn fallback(name: &str) -> Self {
        Self::builtin(name, 0, None, [10, 1, 50, 10, 10, 10], (0.90, 0.95), 2, 2000, 0.70)
    }

    /// Whether `usage_count` falls inside this band
    pub fn contains(&self, usage_count: i64) -> bool {
        usage_count >= self.min_count && self.max_count.map_or(true, |max| usage_count < max)
    }

    /// Clamp a size into `[min_batch_size, max_batch_size]`
    pub fn clamp(&self, size: usize) -> usize {
        let floor = self.min_batch_size.max(1);
        let ceiling = self.max_batch_size.max(floor);
        size.clamp(floor, ceiling)
    }

    /// Apply a `[[tiers]]` entry on top of this profile
    pub fn apply(&mut self, section: &TierSection) {
        self.name = section.name.clone();
        self.min_count = section.min_count;
        self.max_count = section.max_count;
        if let Some(v) = section.batch_size {
            self.batch_size = v;
        }
        if let Some(v) = section.min_batch_size {
            self.min_batch_size = v;
        }
        if let Some(v) = section.max_batch_size {
            self.max_batch_size = v;
        }
        if let Some(v) = section.small_batch {
            self.small_batch = v;
        }
        if let Some(v) = section.medium_batch {
            self.medium_batch = v;
        }
        if let Some(v) = section.large_batch {
            self.large_batch = v;
        }
        if let Some(v) = section.good_threshold {
            self.good_threshold = v;
        }
        if let Some(v) = section.excellent_threshold {
            self.excellent_threshold = v;
        }
        if let Some(v) = section.retry_count {
            self.retry_count = v;
        }
        if let Some(v) = section.delay_ms {
            self.inter_batch_delay = Duration::from_millis(v);
        }
        if let Some(v) = section.confidence_floor {
            self.confidence_floor = v;
        }
    }
}

/// Built-in tiers, highest usage band first
pub fn standard_tiers() -> Vec<TierProfile> {
    vec![
        TierProfile::builtin("100K+", 100_000, None, [20, 5, 25, 15, 20, 20], (0.90, 0.95), 3, 1500, 0.85),
        TierProfile::builtin("50K-100K", 50_000, Some(100_000), [20, 5, 25, 15, 20, 20], (0.90, 0.95), 3, 1500, 0.85),
        TierProfile::builtin("30K-50K", 30_000, Some(50_000), [20, 5, 25, 15, 20, 20], (0.90, 0.95), 3, 1500, 0.80),
        TierProfile::builtin("20K-30K", 20_000, Some(30_000), [15, 5, 20, 10, 12, 15], (0.90, 0.95), 3, 1500, 0.75),
        TierProfile::builtin("10K-20K", 10_000, Some(20_000), [15, 5, 20, 10, 12, 15], (0.88, 0.92), 2, 2000, 0.70),
        TierProfile::builtin("5K-10K", 5_000, Some(10_000), [12, 4, 16, 8, 10, 12], (0.85, 0.90), 2, 2000, 0.70),
        TierProfile::builtin("3K-5K", 3_000, Some(5_000), [12, 4, 16, 8, 10, 12], (0.83, 0.88), 2, 2000, 0.65),
        TierProfile::builtin("1K-3K", 1_000, Some(3_000), [10, 3, 14, 6, 8, 10], (0.80, 0.85), 2, 2500, 0.60),
        TierProfile::builtin("<1K", 0, Some(1_000), [8, 3, 12, 5, 6, 8], (0.80, 0.85), 2, 2500, 0.60),
    ]
}

/// Resolve configured tiers
///
/// With no `[[tiers]]` entries the built-in set is used. Otherwise each entry
/// overrides the built-in profile of the same name, or the fallback profile.
pub fn tiers_from_config(sections: &[TierSection]) -> Vec<TierProfile> {
    if sections.is_empty() {
        return standard_tiers();
    }
    let builtins = standard_tiers();
    sections
        .iter()
        .map(|section| {
            let mut profile = builtins
                .iter()
                .find(|p| p.name == section.name)
                .cloned()
                .unwrap_or_else(|| TierProfile::fallback(&section.name));
            profile.apply(section);
            profile
        })
        .collect()
}

/// Parameters for starting a tier
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendedParams {
    pub batch_size: usize,
    pub retry_count: u32,
    pub inter_batch_delay: Duration,
    pub confidence_floor: f64,
}

/// One logged size change
#[derive(Debug, Clone, Serialize)]
pub struct Adjustment {
    pub from: usize,
    pub to: usize,
    pub success_rate: f64,
    pub tier: String,
    pub reason: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdjustmentSummary {
    pub total: usize,
    pub increases: usize,
    pub decreases: usize,
}

/// Proposes batch sizes from observed success rates
#[derive(Debug, Clone)]
pub struct BatchSizeAdjuster {
    tiers: Vec<TierProfile>,
    history: Vec<Adjustment>,
}

impl BatchSizeAdjuster {
    pub fn new(tiers: Vec<TierProfile>) -> Self {
        Self {
            tiers,
            history: Vec::new(),
        }
    }

    /// Profile for a tier name; unknown names get the fallback profile
    pub fn profile(&self, tier: &str) -> TierProfile {
        self.tiers
            .iter()
            .find(|p| p.name == tier)
            .cloned()
            .unwrap_or_else(|| TierProfile::fallback(tier))
    }

    /// Next batch size for `tier` given the rolling success rate
    pub fn adjust(&mut self, success_rate: f64, tier: &str, current: usize) -> usize {
        let rate = if success_rate.is_nan() { 0.0 } else { success_rate.clamp(0.0, 1.0) };
        let profile = self.profile(tier);

        let target = if rate >= profile.excellent_threshold {
            profile.large_batch
        } else if rate >= profile.good_threshold {
            profile.medium_batch
        } else {
            profile.small_batch
        };

        let damped = if target > current {
            target.min(current.saturating_add(MAX_INCREASE))
        } else if target < current {
            target.max(current.saturating_sub(MAX_DECREASE))
        } else {
            current
        };
        let next = profile.clamp(damped);

        if next != current {
            let reason = adjustment_reason(rate, &profile);
            info!(
                tier = %tier,
                from = current,
                to = next,
                success_rate = rate,
                "Batch size adjusted: {}",
                reason
            );
            self.history.push(Adjustment {
                from: current,
                to: next,
                success_rate: rate,
                tier: tier.to_string(),
                reason,
                at: Utc::now(),
            });
        } else {
            debug!(tier = %tier, size = current, success_rate = rate, "Batch size unchanged");
        }

        next
    }

    pub fn get_recommended_params(&self, tier: &str) -> RecommendedParams {
        let profile = self.profile(tier);
        RecommendedParams {
            batch_size: profile.clamp(profile.batch_size),
            retry_count: profile.retry_count.max(1),
            inter_batch_delay: profile.inter_batch_delay,
            confidence_floor: profile.confidence_floor,
        }
    }

    pub fn history(&self) -> &[Adjustment] {
        &self.history
    }

    pub fn summary(&self) -> AdjustmentSummary {
        AdjustmentSummary {
            total: self.history.len(),
            increases: self.history.iter().filter(|a| a.to > a.from).count(),
            decreases: self.history.iter().filter(|a| a.to < a.from).count(),
        }
    }
}

impl Default for BatchSizeAdjuster {
    fn default() -> Self {
        Self::new(standard_tiers())
    }
}

fn adjustment_reason(rate: f64, profile: &TierProfile) -> String {
    if rate >= profile.excellent_threshold {
        format!("success rate excellent ({:.1}%), growing batch", rate * 100.0)
    } else if rate >= profile.good_threshold {
        format!(
            "success rate good ({:.1}%), settling on the {} medium size",
            rate * 100.0,
            profile.name
        )
    } else {
        format!("success rate low ({:.1}%), shrinking batch to protect quality", rate * 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_tiers_cover_all_usage_counts() {
        let tiers = standard_tiers();
        for usage in [0, 999, 1_000, 4_999, 29_999, 99_999, 100_000, 5_000_000] {
            let matching = tiers.iter().filter(|t| t.contains(usage)).count();
            assert_eq!(matching, 1, "usage {} matched {} tiers", usage, matching);
        }
    }

    #[test]
    fn test_increase_is_damped() {
        let mut adjuster = BatchSizeAdjuster::default();
        // excellent in 30K-50K targets 20; +2 per step
        assert_eq!(adjuster.adjust(0.97, "30K-50K", 12), 14);
        assert_eq!(adjuster.adjust(0.97, "30K-50K", 19), 20);
        assert_eq!(adjuster.adjust(0.97, "30K-50K", 20), 20);
    }

    #[test]
    fn test_decrease_is_damped() {
        let mut adjuster = BatchSizeAdjuster::default();
        // low in 10K-20K targets 10; -3 per step
        assert_eq!(adjuster.adjust(0.50, "10K-20K", 15), 12);
        assert_eq!(adjuster.adjust(0.50, "10K-20K", 12), 10);
    }

    #[test]
    fn test_medium_band() {
        let mut adjuster = BatchSizeAdjuster::default();
        assert_eq!(adjuster.adjust(0.89, "10K-20K", 15), 12);
    }

    #[test]
    fn test_size_stays_within_bounds() {
        let mut adjuster = BatchSizeAdjuster::default();
        for tier in standard_tiers() {
            for rate in [f64::NAN, -1.0, 0.0, 0.5, 0.85, 0.9, 0.99, 1.0, 7.0] {
                for current in [0, 1, 3, 10, 25, 100, usize::MAX] {
                    let next = adjuster.adjust(rate, &tier.name, current);
                    assert!(next >= tier.min_batch_size && next <= tier.max_batch_size);
                }
            }
        }
    }

    #[test]
    fn test_unknown_tier_uses_fallback() {
        let adjuster = BatchSizeAdjuster::default();
        let params = adjuster.get_recommended_params("mystery");
        assert_eq!(params.batch_size, 10);
        assert_eq!(params.retry_count, 2);
        assert_eq!(params.confidence_floor, 0.70);
    }

    #[test]
    fn test_recommended_params() {
        let adjuster = BatchSizeAdjuster::default();
        let params = adjuster.get_recommended_params("100K+");
        assert_eq!(params.batch_size, 20);
        assert_eq!(params.retry_count, 3);
        assert_eq!(params.inter_batch_delay, Duration::from_millis(1500));
        assert_eq!(params.confidence_floor, 0.85);
    }

    #[test]
    fn test_history_and_summary() {
        let mut adjuster = BatchSizeAdjuster::default();
        adjuster.adjust(0.97, "30K-50K", 12);
        adjuster.adjust(0.50, "30K-50K", 20);
        adjuster.adjust(0.97, "30K-50K", 20);

        let summary = adjuster.summary();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.increases, 1);
        assert_eq!(summary.decreases, 1);
        assert_eq!(adjuster.history()[1].from, 20);
        assert_eq!(adjuster.history()[1].to, 17);
        assert!(adjuster.history()[1].reason.contains("low"));
    }

    #[test]
    fn test_config_overrides_builtin() {
        let sections = vec![
            TierSection {
                name: "1K-3K".into(),
                min_count: 1_000,
                max_count: Some(3_000),
                batch_size: Some(4),
                ..Default::default()
            },
            TierSection {
                name: "custom".into(),
                min_count: 0,
                max_count: Some(1_000),
                ..Default::default()
            },
        ];
        let tiers = tiers_from_config(&sections);
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].batch_size, 4);
        assert_eq!(tiers[0].max_batch_size, 14);
        assert_eq!(tiers[1].batch_size, 10);
        assert_eq!(tiers[1].max_count, Some(1_000));
    }
}
