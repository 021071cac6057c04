//! Closed two-level tag taxonomy
//!
//! Every classified label carries exactly one main category and, optionally,
//! one subcategory drawn from the set the main category allows. The set of
//! main categories is closed (see [`MainCategory`]); the allowed subcategory
//! codes per main category live in [`Taxonomy`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// Main category of the taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MainCategory {
    /// Appearance of the depicted people (hair, clothing, body, count)
    CharacterRelated,
    /// Named characters (upstream character category)
    Character,
    /// Free-standing objects and props
    Objects,
    /// Scenes, locations and backgrounds
    Environment,
    /// Framing, camera angle and perspective
    Composition,
    /// Lighting, colour and rendering effects
    VisualEffects,
    /// Drawing or painting style
    ArtStyle,
    /// Poses, gestures and expressions
    ActionPose,
    /// Source works and series (upstream copyright category)
    Copyright,
    /// Creators (upstream artist category)
    Artist,
    /// Subjective quality tags
    Quality,
    /// Resolution, metadata and other technical tags
    Technical,
    /// Sexual or explicit content
    AdultContent,
    /// Seasons, holidays and abstract themes
    ThemeConcept,
}

impl MainCategory {
    /// All main categories in declaration order
    pub const ALL: [MainCategory; 14] = [
        MainCategory::CharacterRelated,
        MainCategory::Character,
        MainCategory::Objects,
        MainCategory::Environment,
        MainCategory::Composition,
        MainCategory::VisualEffects,
        MainCategory::ArtStyle,
        MainCategory::ActionPose,
        MainCategory::Copyright,
        MainCategory::Artist,
        MainCategory::Quality,
        MainCategory::Technical,
        MainCategory::AdultContent,
        MainCategory::ThemeConcept,
    ];

    /// Stable storage code (e.g. `CHARACTER_RELATED`)
    pub fn code(self) -> &'static str {
        match self {
            MainCategory::CharacterRelated => "CHARACTER_RELATED",
            MainCategory::Character => "CHARACTER",
            MainCategory::Objects => "OBJECTS",
            MainCategory::Environment => "ENVIRONMENT",
            MainCategory::Composition => "COMPOSITION",
            MainCategory::VisualEffects => "VISUAL_EFFECTS",
            MainCategory::ArtStyle => "ART_STYLE",
            MainCategory::ActionPose => "ACTION_POSE",
            MainCategory::Copyright => "COPYRIGHT",
            MainCategory::Artist => "ARTIST",
            MainCategory::Quality => "QUALITY",
            MainCategory::Technical => "TECHNICAL",
            MainCategory::AdultContent => "ADULT_CONTENT",
            MainCategory::ThemeConcept => "THEME_CONCEPT",
        }
    }

    /// Exact lookup by storage code
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }
}

impl fmt::Display for MainCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for MainCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
            .ok_or_else(|| crate::Error::InvalidInput(format!("Unknown main category: {}", s)))
    }
}

/// Taxonomy entry for one main category
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyEntry {
    /// Human-readable name
    pub name: String,
    /// One-line description used when describing the taxonomy to the external classifier
    pub description: String,
    /// Allowed subcategory codes mapped to their description
    pub subs: BTreeMap<String, String>,
}

/// The closed taxonomy: main categories and, per main, the allowed subcategories
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Taxonomy {
    entries: BTreeMap<MainCategory, TaxonomyEntry>,
}

impl Taxonomy {
    /// Build a taxonomy from explicit entries
    ///
    /// Every [`MainCategory`] must be present.
    pub fn new(entries: BTreeMap<MainCategory, TaxonomyEntry>) -> crate::Result<Self> {
        if let Some(missing) = MainCategory::ALL.iter().find(|m| !entries.contains_key(m)) {
            return Err(crate::Error::Config(format!(
                "Taxonomy is missing main category {}",
                missing
            )));
        }
        Ok(Self { entries })
    }

    /// The production taxonomy
    pub fn standard() -> Self {
        let mut entries = BTreeMap::new();
        let mut add = |main: MainCategory, name: &str, description: &str, subs: &[(&str, &str)]| {
            entries.insert(
                main,
                TaxonomyEntry {
                    name: name.to_string(),
                    description: description.to_string(),
                    subs: subs
                        .iter()
                        .map(|(code, desc)| (code.to_string(), desc.to_string()))
                        .collect(),
                },
            );
        };

        add(
            MainCategory::CharacterRelated,
            "Character related",
            "appearance of the depicted people: clothing, hair, body, character count",
            &[
                ("CLOTHING", "garments, footwear, headwear"),
                ("HAIR", "hairstyle, hair colour, hair accessories"),
                ("BODY_PARTS", "eyes, hands, ears and other body features"),
                ("ACCESSORIES", "jewellery, glasses and other worn accessories"),
                ("CHARACTER_COUNT", "number and gender of characters, e.g. 1girl, 2boys"),
                ("COLORS", "colours describing the character, e.g. red_lips"),
                ("COSMETICS", "make-up, lipstick, nail polish"),
            ],
        );
        add(
            MainCategory::Character,
            "Character",
            "named characters from a source work",
            &[],
        );
        add(
            MainCategory::Objects,
            "Objects",
            "free-standing objects that are not part of a character's body",
            &[
                ("WEAPONS", "swords, guns and other weapons"),
                ("VEHICLES", "cars, ships, aircraft"),
                ("FURNITURE", "chairs, tables, beds"),
                ("FOOD", "food and drink"),
                ("ANIMALS", "animals and creatures"),
                ("MATERIALS", "rope, chain, leather and other materials"),
                ("MISCELLANEOUS", "any other object"),
            ],
        );
        add(
            MainCategory::Environment,
            "Environment",
            "scenes, locations and backgrounds",
            &[
                ("INDOOR", "indoor locations"),
                ("OUTDOOR", "outdoor locations"),
                ("NATURE", "natural landscapes"),
                ("URBAN", "cities and buildings"),
                ("FANTASY", "fantastical settings"),
            ],
        );
        add(
            MainCategory::Composition,
            "Composition",
            "framing, camera angle and perspective of the image",
            &[
                ("CAMERA_ANGLE", "from_above, from_below"),
                ("FRAMING", "portrait, upper_body, full_body"),
                ("PERSPECTIVE", "looking_at_viewer, pov"),
                ("CROP", "cropping of the subject"),
            ],
        );
        add(
            MainCategory::VisualEffects,
            "Visual effects",
            "lighting, colour treatment and special effects",
            &[
                ("LIGHTING", "light and shadow"),
                ("COLORS", "colour treatment, e.g. monochrome"),
                ("EFFECTS", "sparkles, glow, blur"),
                ("RENDERING", "rendering technique"),
                ("SHAPES", "shapes and patterns"),
            ],
        );
        add(
            MainCategory::ArtStyle,
            "Art style",
            "drawing or painting style",
            &[
                ("ANIME", "anime style"),
                ("REALISTIC", "realistic or photorealistic"),
                ("CARTOON", "cartoon or chibi"),
                ("PAINTERLY", "painting, sketch or traditional media"),
            ],
        );
        add(
            MainCategory::ActionPose,
            "Action / pose",
            "poses, gestures, interactions and facial expressions",
            &[
                ("EXPRESSION", "facial expression and emotion"),
                ("GESTURE", "hand and arm gestures"),
                ("BODY_POSE", "sitting, standing, lying and other body poses"),
                ("INTERACTION", "interaction between characters"),
                ("PROPS", "interaction with objects, e.g. holding_sword"),
            ],
        );
        add(
            MainCategory::Copyright,
            "Copyright",
            "source works, series and franchises",
            &[],
        );
        add(MainCategory::Artist, "Artist", "creators and illustrators", &[]);
        add(
            MainCategory::Quality,
            "Quality",
            "subjective quality judgement, e.g. masterpiece",
            &[],
        );
        add(
            MainCategory::Technical,
            "Technical",
            "resolution, metadata and technical properties of the image",
            &[
                ("METADATA", "resolution and file metadata"),
                ("QUALITY", "level-of-detail tags"),
                ("SOURCE", "translation, official art, source notes"),
                ("FRAMING", "letterboxing, borders"),
            ],
        );
        add(
            MainCategory::AdultContent,
            "Adult content",
            "sexual or explicit content",
            &[
                ("SEXUAL", "sexual acts"),
                ("EXPLICIT_BODY", "nudity and explicit body parts"),
                ("SUGGESTIVE", "suggestive but not explicit"),
                ("CENSORSHIP", "censoring of explicit content"),
            ],
        );
        add(
            MainCategory::ThemeConcept,
            "Theme / concept",
            "seasons, holidays, eras and abstract concepts",
            &[
                ("SEASON", "seasons"),
                ("HOLIDAY", "holidays and celebrations"),
                ("TIME", "eras and time periods"),
                ("WEATHER", "weather phenomena"),
                ("CONCEPT", "abstract concepts"),
            ],
        );

        Self { entries }
    }

    /// Entry for a main category
    pub fn entry(&self, main: MainCategory) -> Option<&TaxonomyEntry> {
        self.entries.get(&main)
    }

    /// Iterate all main categories with their entries
    pub fn iter(&self) -> impl Iterator<Item = (MainCategory, &TaxonomyEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Whether `sub` is an allowed subcategory of `main`
    pub fn allows_sub(&self, main: MainCategory, sub: &str) -> bool {
        self.entries
            .get(&main)
            .map(|e| e.subs.contains_key(sub))
            .unwrap_or(false)
    }

    /// Allowed subcategory codes for `main`
    pub fn subs_of(&self, main: MainCategory) -> BTreeSet<&str> {
        self.entries
            .get(&main)
            .map(|e| e.subs.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Validate a stored (main, sub) pair against the taxonomy
    pub fn is_valid_assignment(&self, main: &str, sub: Option<&str>) -> bool {
        match MainCategory::from_code(main) {
            Some(main) => sub.map(|s| self.allows_sub(main, s)).unwrap_or(true),
            None => false,
        }
    }

    /// Plain-text description of the taxonomy, one main category per block
    pub fn describe(&self) -> String {
        let mut out = String::new();
        for (main, entry) in &self.entries {
            out.push_str(&format!("## {} ({}): {}\n", main, entry.name, entry.description));
            if entry.subs.is_empty() {
                out.push_str("subcategories: none (use null)\n");
            } else {
                out.push_str("subcategories:\n");
                for (code, desc) in &entry.subs {
                    out.push_str(&format!("  - {}: {}\n", code, desc));
                }
            }
        }
        out
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_round_trip() {
        for main in MainCategory::ALL {
            assert_eq!(MainCategory::from_code(main.code()), Some(main));
            assert_eq!(main.code().parse::<MainCategory>().unwrap(), main);
        }
        assert!(MainCategory::from_code("character_related").is_none());
    }

    #[test]
    fn test_serde_uses_storage_code() {
        let json = serde_json::to_string(&MainCategory::VisualEffects).unwrap();
        assert_eq!(json, "\"VISUAL_EFFECTS\"");
    }

    #[test]
    fn test_standard_taxonomy_covers_every_main() {
        let taxonomy = Taxonomy::standard();
        for main in MainCategory::ALL {
            assert!(taxonomy.entry(main).is_some(), "missing {}", main);
        }
    }

    #[test]
    fn test_allows_sub() {
        let taxonomy = Taxonomy::standard();
        assert!(taxonomy.allows_sub(MainCategory::CharacterRelated, "HAIR"));
        assert!(!taxonomy.allows_sub(MainCategory::CharacterRelated, "WEAPONS"));
        assert!(!taxonomy.allows_sub(MainCategory::Quality, "HAIR"));
    }

    #[test]
    fn test_is_valid_assignment() {
        let taxonomy = Taxonomy::standard();
        assert!(taxonomy.is_valid_assignment("OBJECTS", Some("WEAPONS")));
        assert!(taxonomy.is_valid_assignment("ARTIST", None));
        assert!(!taxonomy.is_valid_assignment("null", None));
        assert!(!taxonomy.is_valid_assignment("OBJECTS", Some("HAIR")));
    }

    #[test]
    fn test_new_rejects_incomplete_taxonomy() {
        let mut entries = BTreeMap::new();
        entries.insert(
            MainCategory::Quality,
            TaxonomyEntry {
                name: "Quality".to_string(),
                description: String::new(),
                subs: BTreeMap::new(),
            },
        );
        assert!(Taxonomy::new(entries).is_err());
    }

    #[test]
    fn test_describe_lists_subcategories() {
        let text = Taxonomy::standard().describe();
        assert!(text.contains("## ACTION_POSE"));
        assert!(text.contains("  - EXPRESSION:"));
        assert!(text.contains("subcategories: none (use null)"));
    }
}
