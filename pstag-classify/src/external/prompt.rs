//! Request text for the external classifier

use pstag_common::Taxonomy;

const GUIDANCE: &str = "\
# Classification guidance
1. Choose the category that matches how the tag is most commonly used in images.
2. Colour words: character features (red_lips) -> CHARACTER_RELATED/COLORS, \
garments (blue_dress) -> CHARACTER_RELATED/CLOTHING, \
whole-image colour treatment (colorful) -> VISUAL_EFFECTS/COLORS.
3. Plain body parts (hands, feet) -> CHARACTER_RELATED/BODY_PARTS; \
body parts doing something (hands_up, kicking) -> ACTION_POSE/GESTURE or BODY_POSE.
4. Main garments -> CHARACTER_RELATED/CLOTHING; decorative items (necklace, glasses) -> CHARACTER_RELATED/ACCESSORIES.
5. Material words (rope, chain, leather) -> OBJECTS/MATERIALS.
6. Explicit acts -> ADULT_CONTENT/SEXUAL; nudity -> ADULT_CONTENT/EXPLICIT_BODY; \
suggestive but not explicit -> ADULT_CONTENT/SUGGESTIVE.
7. Confidence: 0.95-1.0 unambiguous, 0.85-0.94 confident, \
0.75-0.84 best of several options, 0.60-0.74 several categories are plausible.
";

const OUTPUT_FORMAT: &str = r#"# Output format
Reply with a single JSON object and nothing else (no markdown fences):
{
  "classifications": [
    {
      "tag": "<tag exactly as given>",
      "main_category": "<main category code>",
      "sub_category": "<subcategory code or null>",
      "confidence": 0.95,
      "reasoning": "<one or two sentences>"
    }
  ]
}
Every tag must appear exactly once. Use only the codes listed above; when no
subcategory fits, set sub_category to null."#;

/// Build the request for one batch of label names
pub fn build_prompt(taxonomy: &Taxonomy, labels: &[String]) -> String {
    // serde_json quoting keeps unusual tags (quotes, backslashes) intact
    let label_list = serde_json::to_string(labels).unwrap_or_else(|_| labels.join(", "));

    format!(
        "You are an expert at classifying image-board tags into a fixed taxonomy. \
Assign each tag below a main category and, where one fits, a subcategory.\n\n\
# Taxonomy\n{}\n{}\n# Tags to classify ({} total)\n{}\n\n{}\n",
        taxonomy.describe(),
        GUIDANCE,
        labels.len(),
        label_list,
        OUTPUT_FORMAT
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_taxonomy_and_labels() {
        let labels = vec!["long_hair".to_string(), "say_\"cheese\"".to_string()];
        let prompt = build_prompt(&Taxonomy::standard(), &labels);

        assert!(prompt.contains("## CHARACTER_RELATED"));
        assert!(prompt.contains("## THEME_CONCEPT"));
        assert!(prompt.contains("\"long_hair\""));
        assert!(prompt.contains(r#""say_\"cheese\"""#));
        assert!(prompt.contains("(2 total)"));
        assert!(prompt.contains("\"classifications\""));
    }
}
