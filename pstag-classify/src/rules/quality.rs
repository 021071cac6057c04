//! Quality rules

use super::{CategoryRules, Pattern};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::Quality,
    subs: &[],
    membership: &[
        Pattern::Contains(&["quality"]),
        Pattern::Exact(&[
            "masterpiece",
            "best",
            "high",
            "low",
            "worst",
            "normal",
            "amazing",
            "great",
            "good",
            "bad",
            "terrible",
        ]),
    ],
};
