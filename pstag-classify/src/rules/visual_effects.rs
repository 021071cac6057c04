//! Visual effect rules

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::VisualEffects,
    subs: &[
        SubRule {
            sub: "LIGHTING",
            patterns: &[
                Pattern::Token(&["light", "lighting", "backlighting", "shadow", "sunbeam"]),
                Pattern::Suffix(&["light", "lighting"]),
                Pattern::Contains(&["shadow"]),
            ],
        },
        SubRule {
            sub: "COLORS",
            patterns: &[
                Pattern::Exact(&[
                    "monochrome",
                    "greyscale",
                    "grayscale",
                    "sepia",
                    "colorful",
                    "vivid",
                    "limited_palette",
                    "spot_color",
                    "partially_colored",
                    "high_contrast",
                    "pastel_colors",
                ]),
                Pattern::Suffix(&["_theme"]),
            ],
        },
        SubRule {
            sub: "EFFECTS",
            patterns: &[
                Pattern::Token(&["glowing", "glow", "sparkle", "sparkles", "bokeh", "blur", "blurry"]),
                Pattern::Exact(&[
                    "depth_of_field",
                    "lens_flare",
                    "chromatic_aberration",
                    "motion_lines",
                    "speed_lines",
                    "film_grain",
                    "bloom",
                    "particles",
                ]),
            ],
        },
        SubRule {
            sub: "RENDERING",
            patterns: &[
                Pattern::Token(&["rendering", "shading", "3d"]),
                Pattern::Exact(&["pixel_art"]),
            ],
        },
        SubRule {
            sub: "SHAPES",
            patterns: &[Pattern::Exact(&[
                "heart",
                "star_(symbol)",
                "circle",
                "triangle",
                "hexagon",
                "spiral",
                "polka_dot",
                "checkered",
                "striped",
                "plaid",
            ])],
        },
    ],
    membership: &[],
};
