//! Adult content rules
//!
//! Evaluated ahead of every other module so that a label that is both
//! clothing-like and explicit is filed as adult content.

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::AdultContent,
    subs: &[
        SubRule {
            sub: "SEXUAL",
            patterns: &[Pattern::Token(&[
                "sex",
                "hetero",
                "yuri",
                "yaoi",
                "masturbation",
                "fellatio",
                "cunnilingus",
                "paizuri",
                "handjob",
                "footjob",
                "penetration",
                "ejaculation",
                "cum",
                "orgasm",
                "intercourse",
                "sexual",
                "erotic",
            ])],
        },
        SubRule {
            sub: "EXPLICIT_BODY",
            patterns: &[
                Pattern::Token(&[
                    "nipples",
                    "areola",
                    "areolae",
                    "penis",
                    "pussy",
                    "vagina",
                    "anus",
                    "ass",
                    "buttocks",
                    "genitals",
                    "nude",
                    "naked",
                    "nudity",
                    "topless",
                    "bottomless",
                    "pubic",
                    "crotch",
                    "groin",
                ]),
                Pattern::Exact(&["breasts_out"]),
            ],
        },
        SubRule {
            sub: "CENSORSHIP",
            patterns: &[Pattern::Contains(&["censor"])],
        },
        SubRule {
            sub: "SUGGESTIVE",
            patterns: &[
                Pattern::Token(&["suggestive", "seductive", "provocative", "sensual", "ahegao"]),
                Pattern::Exact(&["bedroom_eyes", "come_hither"]),
            ],
        },
    ],
    membership: &[],
};
