//! Action and pose rules
//!
//! Expressions are checked first; interactions come before props so that
//! `holding_hands` is an interaction while `holding_sword` is a prop.

use super::{CategoryRules, Pattern, SubRule};
use pstag_common::MainCategory;

pub const RULES: CategoryRules = CategoryRules {
    main: MainCategory::ActionPose,
    subs: &[
        SubRule {
            sub: "EXPRESSION",
            patterns: &[
                Pattern::Token(&[
                    "smile",
                    "smiling",
                    "grin",
                    "grinning",
                    "smirk",
                    "smug",
                    "laugh",
                    "laughing",
                    "giggle",
                    "blush",
                    "blushing",
                    "embarrassed",
                    "crying",
                    "tears",
                    "teary",
                    "sobbing",
                    "sad",
                    "angry",
                    "annoyed",
                    "frown",
                    "frowning",
                    "scared",
                    "afraid",
                    "worried",
                    "nervous",
                    "surprised",
                    "shocked",
                    "confused",
                    "serious",
                    "expressionless",
                    "sleepy",
                    "pout",
                    "pouting",
                    "wink",
                    "winking",
                ]),
                Pattern::Exact(&[
                    "happy",
                    "open_mouth",
                    "closed_mouth",
                    "tongue_out",
                    "closed_eyes",
                    "one_eye_closed",
                    "half-closed_eyes",
                    "narrowed_eyes",
                    "wide-eyed",
                    "raised_eyebrow",
                    "furrowed_brow",
                    "^_^",
                    ">_<",
                    "x_x",
                    ":d",
                    ":o",
                    ":3",
                    ";d",
                ]),
            ],
        },
        SubRule {
            sub: "INTERACTION",
            patterns: &[
                Pattern::Token(&[
                    "hug",
                    "hugging",
                    "kiss",
                    "kissing",
                    "embrace",
                    "embracing",
                    "headpat",
                    "handshake",
                    "piggyback",
                    "fighting",
                ]),
                Pattern::Exact(&["holding_hands", "hand_holding", "princess_carry", "carrying"]),
            ],
        },
        SubRule {
            sub: "PROPS",
            patterns: &[
                Pattern::Prefix(&["holding_"]),
                Pattern::Exact(&["holding", "held"]),
            ],
        },
        SubRule {
            sub: "GESTURE",
            patterns: &[
                Pattern::Prefix(&["arms_", "arm_", "hand_", "hands_"]),
                Pattern::Token(&["waving", "pointing", "salute", "shushing"]),
                Pattern::Exact(&[
                    "peace_sign",
                    "v",
                    "double_v",
                    "thumbs_up",
                    "clenched_hand",
                    "clenched_hands",
                    "fist",
                    "index_finger_raised",
                    "finger_to_mouth",
                    "heart_hands",
                    "crossed_arms",
                    "outstretched_arm",
                    "outstretched_arms",
                    "reaching",
                    "reaching_out",
                ]),
                Pattern::Suffix(&["_gesture"]),
            ],
        },
        SubRule {
            sub: "BODY_POSE",
            patterns: &[
                Pattern::Token(&[
                    "sitting",
                    "standing",
                    "lying",
                    "kneeling",
                    "crouching",
                    "squatting",
                    "leaning",
                    "walking",
                    "running",
                    "jumping",
                    "dancing",
                    "flying",
                    "floating",
                    "swimming",
                    "climbing",
                    "falling",
                    "stretching",
                    "sleeping",
                    "seiza",
                    "wariza",
                    "pose",
                    "posing",
                ]),
                Pattern::Prefix(&["leg_", "legs_"]),
                Pattern::Exact(&[
                    "on_back",
                    "on_side",
                    "on_stomach",
                    "bent_over",
                    "crossed_legs",
                    "spread_legs",
                    "arched_back",
                    "on_one_knee",
                    "all_fours",
                    "indian_style",
                    "fetal_position",
                    "contrapposto",
                ]),
            ],
        },
    ],
    membership: &[],
};
