//! Technical rules: resolution, level of detail, source notes, borders
//!
//! Resolution tags are matched by whole suffix (`absurdres`) rather than a
//! bare `res` ending, which would also catch words like `figures`.

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::Technical,
    subs: &[
        SubRule {
            sub: "METADATA",
            patterns: &[
                Pattern::Suffix(&["highres", "absurdres", "lowres"]),
                Pattern::Prefix(&["resolution"]),
                Pattern::Exact(&["4k", "8k", "1080p", "hd", "uhd", "tagme", "md5_mismatch"]),
                Pattern::Token(&["filesize"]),
            ],
        },
        SubRule {
            sub: "QUALITY",
            patterns: &[Pattern::Contains(&["detailed"])],
        },
        SubRule {
            sub: "SOURCE",
            patterns: &[
                Pattern::Contains(&["commentary", "translat"]),
                Pattern::Suffix(&["_request"]),
                Pattern::Exact(&["official_art", "scan", "game_cg", "screencap", "third-party_edit"]),
            ],
        },
        SubRule {
            sub: "FRAMING",
            patterns: &[
                Pattern::Exact(&["letterboxed", "pillarboxed", "border", "rounded_corners"]),
                Pattern::Suffix(&["_border"]),
            ],
        },
    ],
    membership: &[],
};
