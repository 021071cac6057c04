//! Deterministic rule engine
//!
//! Classifies label names with curated keyword patterns, one module per main
//! category. Modules are evaluated in a fixed priority order and the first
//! module that matches wins; inside a module the first matching subcategory
//! rule wins. A label no module matches is an abstention, `(None, None)`.
//!
//! # Modules (default priority)
//! 1. **adult_content** - sexual, explicit and censorship tags
//! 2. **quality** - subjective quality tags
//! 3. **technical** - resolution and metadata tags
//! 4. **composition** - camera angle, framing, perspective
//! 5. **character_related** - count, hair, clothing, body
//! 6. **visual_effects** - lighting, colour, effects
//! 7. **art_style** - drawing and painting styles
//! 8. **action_pose** - expressions, gestures, poses
//! 9. **environment** - scenes and backgrounds
//! 10. **objects** - props, animals, food
//! 11. **theme_concept** - seasons, holidays, concepts

pub mod action_pose;
pub mod adult_content;
pub mod art_style;
pub mod character_related;
pub mod composition;
pub mod environment;
pub mod objects;
pub mod quality;
pub mod technical;
pub mod theme_concept;
pub mod visual_effects;

use pstag_common::db::OriginCategory;
use pstag_common::MainCategory;
use serde::Serialize;
use std::collections::BTreeMap;

/// A single name pattern
///
/// Token patterns compare against the `_`-separated parts of the name, which
/// avoids substring noise such as `cap` inside `landscape`.
#[derive(Debug, Clone, Copy)]
pub enum Pattern {
    /// Whole name equals one of the words
    Exact(&'static [&'static str]),
    /// Some `_`-separated token equals one of the words
    Token(&'static [&'static str]),
    /// Name contains one of the words
    Contains(&'static [&'static str]),
    /// Name starts with one of the words
    Prefix(&'static [&'static str]),
    /// Name ends with one of the words
    Suffix(&'static [&'static str]),
    /// Every inner pattern matches
    All(&'static [Pattern]),
}

impl Pattern {
    /// Test a normalized (lowercase, trimmed) name
    pub fn matches(&self, name: &str) -> bool {
        match self {
            Pattern::Exact(words) => words.iter().any(|w| name == *w),
            Pattern::Token(words) => name.split('_').any(|t| words.contains(&t)),
            Pattern::Contains(words) => words.iter().any(|w| name.contains(w)),
            Pattern::Prefix(words) => words.iter().any(|w| name.starts_with(w)),
            Pattern::Suffix(words) => words.iter().any(|w| name.ends_with(w)),
            Pattern::All(inner) => inner.iter().all(|p| p.matches(name)),
        }
    }
}

/// Subcategory rule: any pattern matching assigns `sub`
#[derive(Debug, Clone, Copy)]
pub struct SubRule {
    pub sub: &'static str,
    pub patterns: &'static [Pattern],
}

impl SubRule {
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|p| p.matches(name))
    }
}

/// Rules for one main category
///
/// A name belongs to the category when a subcategory rule matches or, failing
/// that, one of the `membership` patterns matches (with no subcategory).
#[derive(Debug, Clone, Copy)]
pub struct CategoryRules {
    pub main: MainCategory,
    pub subs: &'static [SubRule],
    pub membership: &'static [Pattern],
}

impl CategoryRules {
    /// `Some(sub)` on a match; the inner `None` means member without subcategory
    pub fn evaluate(&self, name: &str) -> Option<Option<&'static str>> {
        if let Some(rule) = self.subs.iter().find(|r| r.matches(name)) {
            return Some(Some(rule.sub));
        }
        if self.membership.iter().any(|p| p.matches(name)) {
            return Some(None);
        }
        None
    }
}

/// Outcome of one rule evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RuleDecision {
    pub main: MainCategory,
    pub sub: Option<&'static str>,
    /// Decided by the upstream origin category rather than keyword rules
    pub from_origin: bool,
}

/// Keyword rule engine over an ordered list of category modules
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    modules: Vec<CategoryRules>,
}

impl RuleClassifier {
    /// Engine with the standard module priority
    pub fn new() -> Self {
        Self {
            modules: vec![
                adult_content::RULES,
                quality::RULES,
                technical::RULES,
                composition::RULES,
                character_related::RULES,
                visual_effects::RULES,
                art_style::RULES,
                action_pose::RULES,
                environment::RULES,
                objects::RULES,
                theme_concept::RULES,
            ],
        }
    }

    /// Engine with modules reordered to `order`
    ///
    /// Categories not named in `order` keep their relative standard order
    /// after the named ones.
    pub fn with_priority(order: &[MainCategory]) -> Self {
        let standard = Self::new().modules;
        let mut modules: Vec<CategoryRules> = order
            .iter()
            .filter_map(|main| standard.iter().find(|m| m.main == *main).copied())
            .collect();
        for module in standard {
            if !modules.iter().any(|m| m.main == module.main) {
                modules.push(module);
            }
        }
        Self { modules }
    }

    /// Main categories in evaluation order
    pub fn priority(&self) -> Vec<MainCategory> {
        self.modules.iter().map(|m| m.main).collect()
    }

    /// Classify a label name by keyword rules
    pub fn classify(&self, name: &str) -> (Option<MainCategory>, Option<&'static str>) {
        self.classify_with_origin(name, OriginCategory::General)
    }

    /// [`classify`](Self::classify) with the origin-category shortcut
    pub fn classify_with_origin(
        &self,
        name: &str,
        origin: OriginCategory,
    ) -> (Option<MainCategory>, Option<&'static str>) {
        match self.decide(name, origin) {
            Some(decision) => (Some(decision.main), decision.sub),
            None => (None, None),
        }
    }

    /// Classify using the upstream origin category first
    ///
    /// Artist, copyright, character and meta labels map directly; general
    /// labels fall through to the keyword modules.
    pub fn decide(&self, name: &str, origin: OriginCategory) -> Option<RuleDecision> {
        let name = name.trim().to_lowercase();

        let origin_main = match origin {
            OriginCategory::Artist => Some(MainCategory::Artist),
            OriginCategory::Copyright => Some(MainCategory::Copyright),
            OriginCategory::Character => Some(MainCategory::Character),
            OriginCategory::Meta => Some(MainCategory::Technical),
            OriginCategory::General => None,
        };

        if let Some(main) = origin_main {
            let sub = self
                .modules
                .iter()
                .find(|m| m.main == main)
                .and_then(|m| m.evaluate(&name))
                .flatten();
            return Some(RuleDecision {
                main,
                sub,
                from_origin: true,
            });
        }

        if name.is_empty() {
            return None;
        }

        self.modules.iter().find_map(|module| {
            module.evaluate(&name).map(|sub| RuleDecision {
                main: module.main,
                sub,
                from_origin: false,
            })
        })
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Running counts over rule decisions
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleStats {
    pub classified: u64,
    pub abstained: u64,
    pub from_origin: u64,
    pub by_main: BTreeMap<MainCategory, u64>,
    pub by_sub: BTreeMap<String, u64>,
}

impl RuleStats {
    pub fn record(&mut self, decision: Option<&RuleDecision>) {
        let Some(decision) = decision else {
            self.abstained += 1;
            return;
        };
        self.classified += 1;
        if decision.from_origin {
            self.from_origin += 1;
        }
        *self.by_main.entry(decision.main).or_default() += 1;
        if let Some(sub) = decision.sub {
            *self
                .by_sub
                .entry(format!("{}.{}", decision.main, sub))
                .or_default() += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.classified + self.abstained
    }

    /// Percentage of evaluated names that received a category
    pub fn coverage_percent(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.classified as f64 / total as f64 * 100.0,
        }
    }

    pub fn merge(&mut self, other: &RuleStats) {
        self.classified += other.classified;
        self.abstained += other.abstained;
        self.from_origin += other.from_origin;
        for (main, count) in &other.by_main {
            *self.by_main.entry(*main).or_default() += count;
        }
        for (key, count) in &other.by_sub {
            *self.by_sub.entry(key.clone()).or_default() += count;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pstag_common::Taxonomy;

    fn check(name: &str, main: Option<MainCategory>, sub: Option<&str>) {
        let engine = RuleClassifier::new();
        assert_eq!(engine.classify(name), (main, sub), "label {}", name);
    }

    #[test]
    fn test_character_count() {
        check("1girl", Some(MainCategory::CharacterRelated), Some("CHARACTER_COUNT"));
        check("2boys", Some(MainCategory::CharacterRelated), Some("CHARACTER_COUNT"));
    }

    #[test]
    fn test_unrecognized_label_abstains() {
        check("zzz_unrecognized_000", None, None);
        check("", None, None);
        check("   ", None, None);
    }

    #[test]
    fn test_input_is_normalized() {
        check("  Long_Hair ", Some(MainCategory::CharacterRelated), Some("HAIR"));
    }

    #[test]
    fn test_representative_labels() {
        use MainCategory::*;
        let cases: &[(&str, MainCategory, Option<&str>)] = &[
            ("long_hair", CharacterRelated, Some("HAIR")),
            ("hair_ornament", CharacterRelated, Some("HAIR")),
            ("school_uniform", CharacterRelated, Some("CLOTHING")),
            ("glasses", CharacterRelated, Some("ACCESSORIES")),
            ("red_eyes", CharacterRelated, Some("BODY_PARTS")),
            ("crimson_eyes", CharacterRelated, Some("BODY_PARTS")),
            ("animal_ears", CharacterRelated, Some("BODY_PARTS")),
            ("closed_eyes", ActionPose, Some("EXPRESSION")),
            ("smile", ActionPose, Some("EXPRESSION")),
            ("holding_sword", ActionPose, Some("PROPS")),
            ("holding_hands", ActionPose, Some("INTERACTION")),
            ("peace_sign", ActionPose, Some("GESTURE")),
            ("sitting", ActionPose, Some("BODY_POSE")),
            ("masterpiece", Quality, None),
            ("best_quality", Quality, None),
            ("absurdres", Technical, Some("METADATA")),
            ("extremely_detailed", Technical, Some("QUALITY")),
            ("from_above", Composition, Some("CAMERA_ANGLE")),
            ("looking_at_viewer", Composition, Some("PERSPECTIVE")),
            ("upper_body", Composition, Some("FRAMING")),
            ("cropped_legs", Composition, Some("CROP")),
            ("sunlight", VisualEffects, Some("LIGHTING")),
            ("monochrome", VisualEffects, Some("COLORS")),
            ("motion_blur", VisualEffects, Some("EFFECTS")),
            ("watercolor_(medium)", ArtStyle, Some("PAINTERLY")),
            ("chibi", ArtStyle, Some("CARTOON")),
            ("outdoors", Environment, Some("OUTDOOR")),
            ("landscape", Environment, Some("NATURE")),
            ("cityscape", Environment, Some("URBAN")),
            ("simple_background", Environment, None),
            ("sword", Objects, Some("WEAPONS")),
            ("cat", Objects, Some("ANIMALS")),
            ("cake", Objects, Some("FOOD")),
            ("christmas", ThemeConcept, Some("HOLIDAY")),
            ("rain", ThemeConcept, Some("WEATHER")),
            ("summer", ThemeConcept, Some("SEASON")),
            ("nude", AdultContent, Some("EXPLICIT_BODY")),
            ("mosaic_censoring", AdultContent, Some("CENSORSHIP")),
        ];

        let engine = RuleClassifier::new();
        for (name, main, sub) in cases {
            assert_eq!(engine.classify(name), (Some(*main), *sub), "label {}", name);
        }
    }

    #[test]
    fn test_adult_content_wins_over_clothing() {
        // Matches both a clothing token and an explicit-body token
        let engine = RuleClassifier::new();
        let (main, _) = engine.classify("topless_shirt");
        assert_eq!(main, Some(MainCategory::AdultContent));
    }

    #[test]
    fn test_priority_override_changes_resolution() {
        let engine = RuleClassifier::with_priority(&[MainCategory::CharacterRelated]);
        assert_eq!(engine.priority()[0], MainCategory::CharacterRelated);
        assert_eq!(engine.priority().len(), 11);
        let (main, sub) = engine.classify("topless_shirt");
        assert_eq!(main, Some(MainCategory::CharacterRelated));
        assert_eq!(sub, Some("CLOTHING"));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let engine = RuleClassifier::new();
        for name in ["1girl", "red_eyes", "zzz_unrecognized_000", "holding_sword"] {
            let first = engine.classify(name);
            for _ in 0..10 {
                assert_eq!(engine.classify(name), first);
            }
        }
    }

    #[test]
    fn test_origin_shortcut() {
        let engine = RuleClassifier::new();

        let artist = engine.decide("some_artist", OriginCategory::Artist).unwrap();
        assert_eq!(artist.main, MainCategory::Artist);
        assert_eq!(artist.sub, None);
        assert!(artist.from_origin);

        let meta = engine.decide("highres", OriginCategory::Meta).unwrap();
        assert_eq!(meta.main, MainCategory::Technical);
        assert_eq!(meta.sub, Some("METADATA"));

        let general = engine.decide("1girl", OriginCategory::General).unwrap();
        assert!(!general.from_origin);
    }

    #[test]
    fn test_every_rule_sub_is_in_taxonomy() {
        let taxonomy = Taxonomy::standard();
        for module in RuleClassifier::new().modules {
            for rule in module.subs {
                assert!(
                    taxonomy.allows_sub(module.main, rule.sub),
                    "{} does not allow {}",
                    module.main,
                    rule.sub
                );
            }
        }
    }

    #[test]
    fn test_rule_stats() {
        let engine = RuleClassifier::new();
        let mut stats = RuleStats::default();
        for name in ["1girl", "2girls", "long_hair", "zzz_unrecognized_000"] {
            stats.record(engine.decide(name, OriginCategory::General).as_ref());
        }
        assert_eq!(stats.classified, 3);
        assert_eq!(stats.abstained, 1);
        assert_eq!(stats.by_main[&MainCategory::CharacterRelated], 3);
        assert_eq!(stats.by_sub["CHARACTER_RELATED.CHARACTER_COUNT"], 2);
        assert_eq!(stats.coverage_percent(), 75.0);

        let mut total = RuleStats::default();
        total.merge(&stats);
        total.merge(&stats);
        assert_eq!(total.classified, 6);
    }
}
