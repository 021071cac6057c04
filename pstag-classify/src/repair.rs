//! Post-hoc consistency repair
//!
//! Three independent passes, each safe to re-run:
//! - **sentinel**: literal "null" / "N/A" strings become real NULLs
//! - **group**: members of a morphological group (`red_eyes`, `crimson_eyes`)
//!   are rewritten to the group's majority assignment
//! - **low-confidence**: curated overrides are applied, remaining labels
//!   under the floor are flagged ambiguous
//!
//! Every pass reports `(examined, changed)`; a second run over repaired data
//! changes nothing.

use crate::db::labels;
use crate::rules::character_related::COLOR_WORDS;
use pstag_common::config::RepairSection;
use pstag_common::db::{is_sentinel, Label};
use pstag_common::{Error, MainCategory, Result, Taxonomy};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

/// Source recorded for group rewrites
pub const GROUP_REPAIR_SOURCE: &str = "consistency_repair";
/// Source recorded for curated overrides
pub const OVERRIDE_SOURCE: &str = "manual_override";

const SENTINEL_NOTE: &str = "main category held a null sentinel; classification cleared";
const LOW_CONFIDENCE_NOTE: &str = "low confidence, needs review";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairOutcome {
    pub examined: u64,
    pub changed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairPass {
    Sentinel,
    Group,
    LowConfidence,
}

impl RepairPass {
    pub const ALL: [RepairPass; 3] = [RepairPass::Sentinel, RepairPass::Group, RepairPass::LowConfidence];
}

impl fmt::Display for RepairPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RepairPass::Sentinel => "sentinel",
            RepairPass::Group => "group",
            RepairPass::LowConfidence => "low-confidence",
        })
    }
}

impl FromStr for RepairPass {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sentinel" => Ok(RepairPass::Sentinel),
            "group" => Ok(RepairPass::Group),
            "low-confidence" => Ok(RepairPass::LowConfidence),
            other => Err(Error::InvalidInput(format!("unknown repair pass '{}'", other))),
        }
    }
}

/// Labels sharing a suffix whose prefix is made only of known descriptor words
#[derive(Debug, Clone, Copy)]
pub struct MorphGroup {
    pub suffix: &'static str,
    pub descriptors: &'static [&'static [&'static str]],
}

impl MorphGroup {
    /// Whether `name` is `<descriptor>[_<descriptor>...]<suffix>`
    pub fn contains(&self, name: &str) -> bool {
        let Some(prefix) = name.strip_suffix(self.suffix) else {
            return false;
        };
        !prefix.is_empty()
            && prefix
                .split('_')
                .all(|token| self.descriptors.iter().any(|set| set.contains(&token)))
    }

    pub fn label(&self) -> String {
        format!("*{}", self.suffix)
    }
}

const EXTRA_EYE_WORDS: &[&str] = &["hazel", "teal", "cyan", "heterochromia"];
const HAIR_LENGTHS: &[&str] = &["long", "short", "very", "medium", "absurdly"];

/// Eye-colour and hair colour/length families
pub const STANDARD_GROUPS: &[MorphGroup] = &[
    MorphGroup {
        suffix: "_eyes",
        descriptors: &[COLOR_WORDS, EXTRA_EYE_WORDS],
    },
    MorphGroup {
        suffix: "_hair",
        descriptors: &[COLOR_WORDS, HAIR_LENGTHS],
    },
];

/// A known-correct classification applied by the low-confidence pass
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOverride {
    pub name: String,
    pub main: MainCategory,
    pub sub: Option<String>,
    pub confidence: f64,
    pub reasoning: String,
}

impl RepairOverride {
    /// Validate a configured override against the taxonomy
    pub fn from_section(
        section: &pstag_common::config::OverrideSection,
        taxonomy: &Taxonomy,
    ) -> Result<Self> {
        let main = section.main_category.parse::<MainCategory>()?;
        if let Some(sub) = &section.sub_category {
            if !taxonomy.allows_sub(main, sub) {
                return Err(Error::Config(format!(
                    "override for '{}': {} is not a subcategory of {}",
                    section.name, sub, main
                )));
            }
        }
        if !(0.0..=1.0).contains(&section.confidence) {
            return Err(Error::Config(format!(
                "override for '{}': confidence {} outside [0, 1]",
                section.name, section.confidence
            )));
        }
        Ok(Self {
            name: section.name.clone(),
            main,
            sub: section.sub_category.clone(),
            confidence: section.confidence,
            reasoning: section.reasoning.clone(),
        })
    }
}

/// Settings for the repair passes
#[derive(Debug, Clone)]
pub struct RepairSettings {
    pub low_confidence_floor: f64,
    pub overrides: Vec<RepairOverride>,
    pub groups: Vec<MorphGroup>,
}

impl RepairSettings {
    pub fn from_section(section: &RepairSection, taxonomy: &Taxonomy) -> Result<Self> {
        let overrides = section
            .overrides
            .iter()
            .map(|o| RepairOverride::from_section(o, taxonomy))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            low_confidence_floor: section.low_confidence_floor,
            overrides,
            groups: STANDARD_GROUPS.to_vec(),
        })
    }
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            low_confidence_floor: RepairSection::default().low_confidence_floor,
            overrides: Vec::new(),
            groups: STANDARD_GROUPS.to_vec(),
        }
    }
}

/// Assignment key used for group voting
type Assignment = (String, Option<String>);

#[derive(Debug, Default)]
struct Tally {
    count: usize,
    usage: i64,
    confidence: f64,
}

pub struct ConsistencyRepairer {
    pool: SqlitePool,
    taxonomy: Taxonomy,
    settings: RepairSettings,
}

impl ConsistencyRepairer {
    pub fn new(pool: SqlitePool, taxonomy: Taxonomy, settings: RepairSettings) -> Self {
        Self {
            pool,
            taxonomy,
            settings,
        }
    }

    pub async fn run_pass(&self, pass: RepairPass) -> Result<RepairOutcome> {
        let outcome = match pass {
            RepairPass::Sentinel => self.repair_sentinels().await?,
            RepairPass::Group => self.repair_groups().await?,
            RepairPass::LowConfidence => self.triage_low_confidence().await?,
        };
        info!(
            pass = %pass,
            examined = outcome.examined,
            changed = outcome.changed,
            "Repair pass complete"
        );
        Ok(outcome)
    }

    /// Run every pass in order
    pub async fn run_all(&self) -> Result<Vec<(RepairPass, RepairOutcome)>> {
        let mut results = Vec::new();
        for pass in RepairPass::ALL {
            results.push((pass, self.run_pass(pass).await?));
        }
        Ok(results)
    }

    pub async fn repair_sentinels(&self) -> Result<RepairOutcome> {
        let (examined, changed) = labels::clear_sentinels(&self.pool, SENTINEL_NOTE).await?;
        Ok(RepairOutcome { examined, changed })
    }

    pub async fn repair_groups(&self) -> Result<RepairOutcome> {
        let mut outcome = RepairOutcome::default();
        for group in &self.settings.groups {
            let members: Vec<Label> = labels::fetch_classified_with_suffix(&self.pool, group.suffix)
                .await?
                .into_iter()
                .filter(|l| group.contains(&l.name))
                .filter(|l| l.main_category.as_deref().map_or(false, |m| !is_sentinel(m)))
                .collect();
            outcome.examined += members.len() as u64;
            outcome.changed += self.repair_group(group, &members).await?;
        }
        Ok(outcome)
    }

    async fn repair_group(&self, group: &MorphGroup, members: &[Label]) -> Result<u64> {
        let mut tallies: BTreeMap<Assignment, Tally> = BTreeMap::new();
        for member in members {
            let tally = tallies.entry(assignment_of(member)).or_default();
            tally.count += 1;
            tally.usage += member.usage_count;
            tally.confidence += member.confidence.unwrap_or(0.0);
        }
        if tallies.len() < 2 {
            return Ok(0);
        }

        // BTreeMap iteration is ordered, so equal tallies keep the smallest key
        let mut majority: Option<(&Assignment, &Tally)> = None;
        for (key, tally) in &tallies {
            let better = match majority {
                None => true,
                Some((_, best)) => {
                    (tally.count, tally.usage)
                        .cmp(&(best.count, best.usage))
                        .then(tally.confidence.total_cmp(&best.confidence))
                        .is_gt()
                }
            };
            if better {
                majority = Some((key, tally));
            }
        }
        let Some(((main, sub), tally)) = majority else {
            return Ok(0);
        };

        if !self.taxonomy.is_valid_assignment(main, sub.as_deref()) {
            warn!(
                group = %group.label(),
                main = %main,
                sub = ?sub,
                "Group majority is not a valid assignment, skipping"
            );
            return Ok(0);
        }

        let mut changed = 0;
        for member in members {
            let current = assignment_of(member);
            if current.0 == *main && current.1 == *sub {
                continue;
            }
            let note = format!(
                "group {}: {} -> {} to match {} of {} members",
                group.label(),
                describe(&current),
                describe(&(main.clone(), sub.clone())),
                tally.count,
                members.len()
            );
            debug!(label = %member.name, note = %note, "Rewriting group minority");
            if labels::rewrite_classification(
                &self.pool,
                &member.name,
                main,
                sub.as_deref(),
                GROUP_REPAIR_SOURCE,
                member.confidence,
                None,
                &note,
            )
            .await?
            {
                changed += 1;
            }
        }

        if changed > 0 {
            info!(
                group = %group.label(),
                members = members.len(),
                changed,
                main = %main,
                sub = ?sub,
                "Group made consistent"
            );
        }
        Ok(changed)
    }

    pub async fn triage_low_confidence(&self) -> Result<RepairOutcome> {
        let floor = self.settings.low_confidence_floor;
        let mut outcome = RepairOutcome::default();

        for o in &self.settings.overrides {
            let Some(label) = labels::get_label(&self.pool, &o.name).await? else {
                continue;
            };
            outcome.examined += 1;

            let needs_attention = label.main_category.as_deref().map_or(true, is_sentinel)
                || label.confidence.map_or(true, |c| c < floor);
            let already_applied = label.main_category.as_deref() == Some(o.main.code())
                && label.sub_category == o.sub
                && label.confidence == Some(o.confidence);
            if !needs_attention || already_applied {
                continue;
            }

            let note = format!(
                "manual override: {} -> {}",
                describe(&assignment_of(&label)),
                describe(&(o.main.code().to_string(), o.sub.clone()))
            );
            labels::rewrite_classification(
                &self.pool,
                &o.name,
                o.main.code(),
                o.sub.as_deref(),
                OVERRIDE_SOURCE,
                Some(o.confidence),
                Some(&o.reasoning),
                &note,
            )
            .await?;
            labels::clear_ambiguous(&self.pool, &o.name).await?;
            info!(label = %o.name, main = %o.main, sub = ?o.sub, "Override applied");
            outcome.changed += 1;
        }

        let override_names: Vec<String> = self.settings.overrides.iter().map(|o| o.name.clone()).collect();
        outcome.examined += labels::count_low_confidence(&self.pool, floor).await?.max(0) as u64;
        let flagged = labels::flag_low_confidence(&self.pool, floor, LOW_CONFIDENCE_NOTE, &override_names).await?;
        if flagged > 0 {
            info!(flagged, floor, "Flagged low-confidence labels as ambiguous");
        }
        outcome.changed += flagged;

        Ok(outcome)
    }
}

fn assignment_of(label: &Label) -> Assignment {
    (
        label.main_category.clone().unwrap_or_default(),
        label.sub_category.clone().filter(|s| !is_sentinel(s)),
    )
}

fn describe(assignment: &Assignment) -> String {
    match &assignment.1 {
        Some(sub) => format!("{}/{}", assignment.0, sub),
        None => assignment.0.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_membership() {
        let eyes = STANDARD_GROUPS[0];
        assert!(eyes.contains("red_eyes"));
        assert!(eyes.contains("crimson_eyes"));
        assert!(eyes.contains("light_blue_eyes"));
        assert!(!eyes.contains("closed_eyes"));
        assert!(!eyes.contains("_eyes"));
        assert!(!eyes.contains("eyes"));

        let hair = STANDARD_GROUPS[1];
        assert!(hair.contains("very_long_hair"));
        assert!(hair.contains("pink_hair"));
        assert!(!hair.contains("messy_hair"));
    }

    #[test]
    fn test_override_validation() {
        let taxonomy = Taxonomy::standard();
        let settings = RepairSettings::from_section(&RepairSection::default(), &taxonomy).unwrap();
        assert_eq!(settings.overrides.len(), 1);
        assert_eq!(settings.overrides[0].main, MainCategory::ActionPose);

        let bad = pstag_common::config::OverrideSection {
            name: "x".into(),
            main_category: "OBJECTS".into(),
            sub_category: Some("HAIR".into()),
            confidence: 0.9,
            reasoning: String::new(),
        };
        assert!(RepairOverride::from_section(&bad, &taxonomy).is_err());
    }

    #[test]
    fn test_pass_names() {
        for pass in RepairPass::ALL {
            assert_eq!(pass.to_string().parse::<RepairPass>().unwrap(), pass);
        }
        assert!("everything".parse::<RepairPass>().is_err());
    }
}
