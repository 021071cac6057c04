//! Response sanitization, parsing and normalization
//!
//! The external classifier is asked for a bare JSON object but in practice
//! wraps it in markdown fences, adds prose around it, or emits escapes JSON
//! does not allow (`\_`, `\(`). [`sanitize`] repairs those before parsing.
//!
//! Normalization maps free-form category strings into the closed taxonomy:
//! 1. exact main-category code
//! 2. alias table (synonyms, plurals, misspellings)
//! 3. token normalization (uppercase, non-alphanumeric to `_`) retried
//!    against 1 and 2
//!
//! Anything still unresolved leaves that one label unclassified.

use crate::error::ClassifierError;
use pstag_common::db::is_sentinel;
use pstag_common::{MainCategory, Taxonomy};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// One entry of the `classifications` array, before normalization
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawClassification {
    #[serde(alias = "label", alias = "name")]
    pub tag: String,
    #[serde(default)]
    pub main_category: Option<Value>,
    #[serde(default)]
    pub sub_category: Option<Value>,
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub reasoning: Option<Value>,
}

/// Strip markdown fencing and surrounding prose, then drop illegal escapes
pub fn sanitize(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(start) = text.find("```") {
        let after = &text[start + 3..];
        // Skip the info string (`json`) on the opening fence line
        let body = match after.find('\n') {
            Some(newline) if !after[..newline].contains('{') => &after[newline + 1..],
            _ => after.trim_start_matches("json"),
        };
        text = match body.find("```") {
            Some(end) => &body[..end],
            None => body,
        };
        text = text.trim();
    }

    if !text.starts_with('{') {
        if let (Some(open), Some(close)) = (text.find('{'), text.rfind('}')) {
            if open < close {
                text = &text[open..=close];
            }
        }
    }

    remove_invalid_escapes(text)
}

/// Drop every backslash that does not start a valid JSON escape
fn remove_invalid_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some(&next) if matches!(next, '"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => {}
        }
    }
    out
}

/// Parse a raw response body into its classification entries
///
/// The body must contain an object with a `classifications` array; any other
/// shape is a parse failure. Array entries that are not objects with a tag
/// are skipped.
pub fn parse_response(raw: &str) -> Result<Vec<RawClassification>, ClassifierError> {
    let cleaned = sanitize(raw);

    let value: Value = match serde_json::from_str(&cleaned) {
        Ok(value) => value,
        Err(first) => {
            // Raw control characters inside strings: retry with whitespace collapsed
            let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
            serde_json::from_str(&collapsed).map_err(|_| {
                ClassifierError::Parse(format!(
                    "invalid JSON ({}): {}",
                    first,
                    preview(&cleaned)
                ))
            })?
        }
    };

    let entries = value
        .get("classifications")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            ClassifierError::Parse(format!(
                "response has no classifications array: {}",
                preview(&cleaned)
            ))
        })?;

    let mut parsed = Vec::with_capacity(entries.len());
    for entry in entries {
        match serde_json::from_value::<RawClassification>(entry.clone()) {
            Ok(item) => parsed.push(item),
            Err(e) => warn!(error = %e, "Skipping malformed classification entry"),
        }
    }
    Ok(parsed)
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}

/// Uppercase and replace every run of non-alphanumeric characters with `_`
pub fn token_normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_uppercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Main-category synonyms; an alias may also imply a subcategory
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    entries: BTreeMap<String, (MainCategory, Option<String>)>,
}

impl AliasTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Synonyms seen in practice
    pub fn standard() -> Self {
        use MainCategory::*;
        let mut table = Self::empty();
        let plain: &[(&str, MainCategory)] = &[
            ("CHARACTERRELATED", CharacterRelated),
            ("CHARACTER_FEATURES", CharacterRelated),
            ("CHARACTER_APPEARANCE", CharacterRelated),
            ("APPEARANCE", CharacterRelated),
            ("CHARACTOR_RELATED", CharacterRelated),
            ("CHARACTERS", Character),
            ("CHARACTER_NAME", Character),
            ("OBJECT", Objects),
            ("ITEMS", Objects),
            ("ENVIRONMENTS", Environment),
            ("ENVIROMENT", Environment),
            ("SCENE", Environment),
            ("SCENERY", Environment),
            ("BACKGROUND", Environment),
            ("SETTING", Environment),
            ("COMPOSTION", Composition),
            ("CAMERA", Composition),
            ("VISUAL_EFFECT", VisualEffects),
            ("VISUALEFFECTS", VisualEffects),
            ("EFFECTS", VisualEffects),
            ("STYLE", ArtStyle),
            ("ARTSTYLE", ArtStyle),
            ("ART", ArtStyle),
            ("ACTION", ActionPose),
            ("ACTIONS", ActionPose),
            ("ACTION_POSES", ActionPose),
            ("ACTIONPOSE", ActionPose),
            ("COPYRIGHTS", Copyright),
            ("SERIES", Copyright),
            ("FRANCHISE", Copyright),
            ("ARTISTS", Artist),
            ("CREATOR", Artist),
            ("TECH", Technical),
            ("META", Technical),
            ("ADULT", AdultContent),
            ("NSFW", AdultContent),
            ("ADULTCONTENT", AdultContent),
            ("THEME", ThemeConcept),
            ("THEMES", ThemeConcept),
            ("CONCEPT", ThemeConcept),
            ("THEMECONCEPT", ThemeConcept),
        ];
        for (alias, main) in plain {
            table.insert(alias, *main, None);
        }

        let with_sub: &[(&str, MainCategory, &str)] = &[
            ("CLOTHING", CharacterRelated, "CLOTHING"),
            ("CLOTHES", CharacterRelated, "CLOTHING"),
            ("HAIR", CharacterRelated, "HAIR"),
            ("BODY_PARTS", CharacterRelated, "BODY_PARTS"),
            ("ACCESSORIES", CharacterRelated, "ACCESSORIES"),
            ("CHARACTER_COUNT", CharacterRelated, "CHARACTER_COUNT"),
            ("EXPRESSION", ActionPose, "EXPRESSION"),
            ("GESTURE", ActionPose, "GESTURE"),
            ("POSE", ActionPose, "BODY_POSE"),
            ("BODY_POSE", ActionPose, "BODY_POSE"),
            ("LIGHTING", VisualEffects, "LIGHTING"),
            ("METADATA", Technical, "METADATA"),
            ("WEAPONS", Objects, "WEAPONS"),
            ("ANIMALS", Objects, "ANIMALS"),
            ("FOOD", Objects, "FOOD"),
        ];
        for (alias, main, sub) in with_sub {
            table.insert(alias, *main, Some(sub));
        }
        table
    }

    /// Add or replace an alias; the key is token-normalized
    pub fn insert(&mut self, alias: &str, main: MainCategory, sub: Option<&str>) {
        self.entries
            .insert(token_normalize(alias), (main, sub.map(str::to_string)));
    }

    /// Parse `MAIN` or `MAIN/SUB` targets from configuration
    pub fn extend_from_config(
        &mut self,
        extra: &BTreeMap<String, String>,
        taxonomy: &Taxonomy,
    ) -> Result<(), String> {
        for (alias, target) in extra {
            let (main_raw, sub_raw) = match target.split_once('/') {
                Some((main, sub)) => (main, Some(sub.trim())),
                None => (target.as_str(), None),
            };
            let main = MainCategory::from_code(main_raw.trim())
                .ok_or_else(|| format!("alias {} targets unknown category {}", alias, main_raw))?;
            if let Some(sub) = sub_raw {
                if !taxonomy.allows_sub(main, sub) {
                    return Err(format!("alias {} targets {}/{} which is not allowed", alias, main, sub));
                }
            }
            self.insert(alias, main, sub_raw);
        }
        Ok(())
    }

    pub fn lookup(&self, key: &str) -> Option<(MainCategory, Option<&str>)> {
        self.entries
            .get(key)
            .map(|(main, sub)| (*main, sub.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Resolve a free-form main category; `None` when it cannot be mapped
pub fn normalize_main<'a>(
    raw: &str,
    aliases: &'a AliasTable,
) -> Option<(MainCategory, Option<&'a str>)> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_sentinel(trimmed) {
        return None;
    }

    if let Some(main) = MainCategory::from_code(trimmed) {
        return Some((main, None));
    }
    if let Some(hit) = aliases.lookup(trimmed) {
        return Some(hit);
    }

    let normalized = token_normalize(trimmed);
    if let Some(main) = MainCategory::from_code(&normalized) {
        return Some((main, None));
    }
    aliases.lookup(&normalized)
}

const SUB_ALIASES: &[(MainCategory, &str, &str)] = &[
    (MainCategory::ActionPose, "POSE", "BODY_POSE"),
    (MainCategory::CharacterRelated, "CLOTHES", "CLOTHING"),
    (MainCategory::CharacterRelated, "BODY", "BODY_PARTS"),
    (MainCategory::Objects, "MISC", "MISCELLANEOUS"),
    (MainCategory::Objects, "OTHER", "MISCELLANEOUS"),
];

/// Accept a subcategory only if the taxonomy allows it under `main`
pub fn normalize_sub(main: MainCategory, raw: &str, taxonomy: &Taxonomy) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || is_sentinel(trimmed) {
        return None;
    }
    let normalized = token_normalize(trimmed);
    if taxonomy.allows_sub(main, &normalized) {
        return Some(normalized);
    }
    SUB_ALIASES
        .iter()
        .find(|(m, alias, _)| *m == main && *alias == normalized)
        .map(|(_, _, sub)| sub.to_string())
        .filter(|sub| taxonomy.allows_sub(main, sub))
}

/// Parse a confidence value, defaulting to `floor`, always within [0, 1]
pub fn parse_confidence(value: Option<&Value>, floor: f64) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => {
            let s = s.trim();
            match s.strip_suffix('%') {
                Some(percent) => percent.trim().parse::<f64>().ok().map(|p| p / 100.0),
                None => s.parse::<f64>().ok(),
            }
        }
        _ => None,
    };
    let confidence = match parsed {
        Some(c) if c.is_finite() => c,
        _ => floor,
    };
    let confidence = confidence.clamp(0.0, 1.0);
    if confidence.is_nan() {
        0.0
    } else {
        confidence
    }
}

/// String content of an optional JSON value
pub fn value_as_text(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}
