//! Composition rules

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::Composition,
    subs: &[
        SubRule {
            sub: "CAMERA_ANGLE",
            patterns: &[
                Pattern::Prefix(&["from_"]),
                Pattern::Token(&["view", "angle"]),
            ],
        },
        SubRule {
            sub: "PERSPECTIVE",
            patterns: &[
                Pattern::Prefix(&["looking_"]),
                Pattern::Token(&["pov", "perspective", "foreshortening", "fisheye"]),
                Pattern::Exact(&["eye_contact"]),
            ],
        },
        SubRule {
            sub: "FRAMING",
            patterns: &[
                Pattern::Exact(&["upper_body", "lower_body", "full_body"]),
                Pattern::Token(&["shot", "portrait", "close-up"]),
            ],
        },
        SubRule {
            sub: "CROP",
            patterns: &[
                Pattern::Exact(&["cropped"]),
                Pattern::Prefix(&["cropped_"]),
                Pattern::Contains(&["out_of_frame"]),
            ],
        },
    ],
    membership: &[],
};
