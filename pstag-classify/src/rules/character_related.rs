//! Character appearance rules
//!
//! Subcategory order matters: character count is checked first, hair before
//! accessories so `hair_ornament` stays with hair, and eye colours only count
//! as body parts when a colour word is present (`closed_eyes` is an
//! expression, not a body part).

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

/// Colour words shared with the morphological repair groups
pub const COLOR_WORDS: &[&str] = &[
    "red", "blue", "green", "yellow", "purple", "pink", "brown", "black", "white", "grey", "gray",
    "orange", "aqua", "silver", "golden", "gold", "crimson", "amber", "violet", "multicolored",
    "light", "dark", "blonde",
];

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::CharacterRelated,
    subs: &[
        SubRule {
            sub: "CHARACTER_COUNT",
            patterns: &[Pattern::Exact(&[
                "1girl",
                "2girls",
                "3girls",
                "4girls",
                "5girls",
                "6+girls",
                "multiple_girls",
                "many_girls",
                "1boy",
                "2boys",
                "3boys",
                "4boys",
                "5boys",
                "6+boys",
                "multiple_boys",
                "many_boys",
                "1other",
                "multiple_others",
                "solo",
                "duo",
                "trio",
                "group",
                "solo_focus",
                "male",
                "female",
                "male_focus",
                "female_focus",
            ])],
        },
        SubRule {
            sub: "HAIR",
            patterns: &[
                Pattern::Suffix(&["_hair"]),
                Pattern::Prefix(&["hair_"]),
                Pattern::Token(&[
                    "ponytail",
                    "twintails",
                    "braid",
                    "braids",
                    "braided",
                    "bun",
                    "bangs",
                    "ahoge",
                    "sidelocks",
                    "hairband",
                    "hairclip",
                    "hairpin",
                ]),
                Pattern::Exact(&["hair", "bob_cut", "pixie_cut", "double_bun"]),
            ],
        },
        SubRule {
            sub: "ACCESSORIES",
            patterns: &[Pattern::Token(&[
                "glasses",
                "sunglasses",
                "goggles",
                "earrings",
                "necklace",
                "bracelet",
                "choker",
                "jewelry",
                "pendant",
                "brooch",
                "monocle",
                "eyepatch",
                "wristwatch",
            ])],
        },
        SubRule {
            sub: "CLOTHING",
            patterns: &[
                Pattern::Token(&[
                    "shirt",
                    "blouse",
                    "sweater",
                    "cardigan",
                    "hoodie",
                    "jacket",
                    "coat",
                    "blazer",
                    "vest",
                    "skirt",
                    "miniskirt",
                    "pants",
                    "trousers",
                    "jeans",
                    "shorts",
                    "leggings",
                    "dress",
                    "gown",
                    "robe",
                    "kimono",
                    "yukata",
                    "hakama",
                    "jumpsuit",
                    "overalls",
                    "uniform",
                    "serafuku",
                    "maid",
                    "armor",
                    "swimsuit",
                    "bikini",
                    "bodysuit",
                    "leotard",
                    "hat",
                    "cap",
                    "beret",
                    "helmet",
                    "crown",
                    "tiara",
                    "hood",
                    "gloves",
                    "mittens",
                    "boots",
                    "shoes",
                    "sandals",
                    "heels",
                    "sneakers",
                    "socks",
                    "stockings",
                    "thighhighs",
                    "kneehighs",
                    "pantyhose",
                    "scarf",
                    "necktie",
                    "bowtie",
                    "ribbon",
                    "belt",
                    "collar",
                    "sleeves",
                    "sleeveless",
                    "apron",
                    "cape",
                    "cloak",
                    "bra",
                    "panties",
                    "lingerie",
                    "clothes",
                    "outfit",
                    "turtleneck",
                    "warmers",
                ]),
                Pattern::Suffix(&["wear"]),
                Pattern::Exact(&["tank_top", "crop_top", "tube_top"]),
            ],
        },
        SubRule {
            sub: "COSMETICS",
            patterns: &[
                Pattern::Token(&["makeup", "lipstick", "eyeshadow", "eyeliner", "mascara"]),
                Pattern::Exact(&["nail_polish"]),
            ],
        },
        SubRule {
            sub: "BODY_PARTS",
            patterns: &[
                Pattern::All(&[Pattern::Suffix(&["_eyes"]), Pattern::Token(COLOR_WORDS)]),
                Pattern::Suffix(&["_ears", "_tail", "_breasts"]),
                Pattern::Token(&[
                    "breasts",
                    "navel",
                    "collarbone",
                    "thighs",
                    "midriff",
                    "cleavage",
                    "freckles",
                    "fang",
                    "fangs",
                    "abs",
                    "muscular",
                    "horns",
                    "wings",
                    "heterochromia",
                ]),
                Pattern::Exact(&["tail", "flat_chest", "pointy_ears"]),
            ],
        },
    ],
    membership: &[],
};
