//! Theme and concept rules
//!
//! Lowest priority: most of these words also occur inside more concrete
//! labels (`santa_hat`, `christmas_tree`) that earlier modules claim.

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::ThemeConcept,
    subs: &[
        SubRule {
            sub: "SEASON",
            patterns: &[
                Pattern::Token(&[
                    "spring",
                    "summer",
                    "autumn",
                    "winter",
                    "season",
                    "seasonal",
                    "springtime",
                    "summertime",
                    "wintertime",
                ]),
                Pattern::Exact(&["fall_(season)"]),
            ],
        },
        SubRule {
            sub: "HOLIDAY",
            patterns: &[
                Pattern::Token(&[
                    "christmas",
                    "xmas",
                    "santa",
                    "halloween",
                    "valentine",
                    "valentines",
                    "easter",
                    "thanksgiving",
                    "birthday",
                    "anniversary",
                    "wedding",
                    "graduation",
                    "holiday",
                    "celebration",
                    "festival",
                    "tanabata",
                ]),
                Pattern::Exact(&["new_year", "happy_new_year", "jack-o'-lantern"]),
            ],
        },
        SubRule {
            sub: "TIME",
            patterns: &[Pattern::Token(&[
                "time",
                "past",
                "future",
                "ancient",
                "modern",
                "contemporary",
                "medieval",
                "futuristic",
                "era",
            ])],
        },
        SubRule {
            sub: "WEATHER",
            patterns: &[Pattern::Token(&[
                "weather",
                "storm",
                "stormy",
                "lightning",
                "thunder",
                "fog",
                "foggy",
                "mist",
                "misty",
                "wind",
                "windy",
                "breeze",
                "rain",
                "raining",
                "snow",
                "snowing",
                "snowflakes",
            ])],
        },
        SubRule {
            sub: "CONCEPT",
            patterns: &[
                Pattern::Token(&[
                    "love",
                    "romance",
                    "romantic",
                    "friendship",
                    "peace",
                    "war",
                    "dream",
                    "nightmare",
                    "fantasy",
                    "magic",
                    "magical",
                    "mystery",
                    "parody",
                    "crossover",
                    "concept",
                    "cyberpunk",
                    "steampunk",
                ]),
                Pattern::Exact(&["alternate_costume", "alternate_outfit", "genderswap"]),
            ],
        },
    ],
    membership: &[],
};
