//! Object rules

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::Objects,
    subs: &[
        SubRule {
            sub: "WEAPONS",
            patterns: &[
                Pattern::Token(&[
                    "weapon", "sword", "katana", "gun", "handgun", "rifle", "knife", "dagger",
                    "spear", "axe", "shield", "scythe", "polearm", "wand",
                ]),
                Pattern::Exact(&["bow_(weapon)"]),
            ],
        },
        SubRule {
            sub: "VEHICLES",
            patterns: &[Pattern::Token(&[
                "vehicle", "car", "motorcycle", "bicycle", "train", "ship", "boat", "airplane",
                "aircraft", "truck", "bus",
            ])],
        },
        SubRule {
            sub: "FURNITURE",
            patterns: &[Pattern::Token(&[
                "furniture", "chair", "table", "bed", "couch", "sofa", "desk", "bench", "shelf",
                "bookshelf", "pillow", "cushion", "curtains",
            ])],
        },
        SubRule {
            sub: "FOOD",
            patterns: &[
                Pattern::Token(&[
                    "food", "fruit", "apple", "cake", "bread", "candy", "chocolate", "drink", "tea",
                    "coffee", "dessert", "strawberry", "cherry", "wine", "beer", "pocky",
                    "lollipop", "meat",
                ]),
                Pattern::Exact(&["ice_cream"]),
            ],
        },
        SubRule {
            sub: "ANIMALS",
            patterns: &[Pattern::Token(&[
                "animal", "cat", "dog", "bird", "fish", "horse", "rabbit", "wolf", "dragon",
                "butterfly", "creature",
            ])],
        },
        SubRule {
            sub: "MATERIALS",
            patterns: &[Pattern::Token(&[
                "rope", "chain", "chains", "leather", "latex", "metal", "wooden", "fabric", "silk",
            ])],
        },
        SubRule {
            sub: "MISCELLANEOUS",
            patterns: &[
                Pattern::Token(&[
                    "book", "phone", "cellphone", "smartphone", "bag", "umbrella", "flower",
                    "rose", "plant", "bottle", "box", "instrument", "guitar", "microphone",
                    "camera", "doll", "toy", "cup", "mug", "card", "balloon", "clock", "mirror",
                    "candle", "flag", "gift",
                ]),
                Pattern::Exact(&["stuffed_toy", "stuffed_animal"]),
            ],
        },
    ],
    membership: &[],
};
