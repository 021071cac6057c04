//! Art style rules

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::ArtStyle,
    subs: &[
        SubRule {
            sub: "ANIME",
            patterns: &[Pattern::Token(&["anime"])],
        },
        SubRule {
            sub: "REALISTIC",
            patterns: &[
                Pattern::Token(&["realistic", "photorealistic", "semi-realistic"]),
                Pattern::Exact(&["photo_(medium)"]),
            ],
        },
        SubRule {
            sub: "CARTOON",
            patterns: &[Pattern::Token(&["cartoon", "chibi", "cartoonized"])],
        },
        SubRule {
            sub: "PAINTERLY",
            patterns: &[
                Pattern::Token(&[
                    "sketch",
                    "lineart",
                    "watercolor",
                    "painting",
                    "impressionism",
                    "ukiyo-e",
                ]),
                Pattern::Exact(&[
                    "oil_painting_(medium)",
                    "traditional_media",
                    "ink_(medium)",
                    "pencil_(medium)",
                    "pastel_(medium)",
                    "acrylic_paint_(medium)",
                ]),
            ],
        },
    ],
    membership: &[
        Pattern::Token(&["style", "artstyle", "retro", "vintage"]),
        Pattern::Suffix(&["_(style)"]),
    ],
};
