//! Environment rules
//!
//! Plain backgrounds (`simple_background`, `white_background`) belong to the
//! category without a subcategory.

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::Environment,
    subs: &[
        SubRule {
            sub: "INDOOR",
            patterns: &[
                Pattern::Exact(&["indoors", "inside"]),
                Pattern::Token(&[
                    "room",
                    "bedroom",
                    "classroom",
                    "kitchen",
                    "bathroom",
                    "library",
                    "office",
                    "hallway",
                    "interior",
                    "indoor",
                ]),
            ],
        },
        SubRule {
            sub: "OUTDOOR",
            patterns: &[
                Pattern::Exact(&["outdoors", "outside"]),
                Pattern::Token(&[
                    "outdoor",
                    "sky",
                    "cloud",
                    "clouds",
                    "cloudy",
                    "sunset",
                    "sunrise",
                    "night",
                    "day",
                    "twilight",
                    "beach",
                    "ocean",
                    "sea",
                    "horizon",
                    "field",
                    "starry",
                ]),
            ],
        },
        SubRule {
            sub: "NATURE",
            patterns: &[
                Pattern::Token(&[
                    "nature",
                    "forest",
                    "tree",
                    "trees",
                    "mountain",
                    "grass",
                    "river",
                    "lake",
                    "waterfall",
                    "jungle",
                    "desert",
                    "landscape",
                ]),
                Pattern::Exact(&["flower_field"]),
            ],
        },
        SubRule {
            sub: "URBAN",
            patterns: &[Pattern::Token(&[
                "city",
                "cityscape",
                "street",
                "building",
                "road",
                "town",
                "house",
                "alley",
                "rooftop",
                "bridge",
                "shop",
            ])],
        },
        SubRule {
            sub: "FANTASY",
            patterns: &[
                Pattern::Token(&["castle", "dungeon", "ruins"]),
                Pattern::Exact(&["floating_island", "outer_space"]),
            ],
        },
    ],
    membership: &[Pattern::Contains(&["background", "scenery"])],
};
