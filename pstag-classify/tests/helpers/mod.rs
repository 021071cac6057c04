//! Test Helper Utilities
//!
//! Shared utilities for pstag-classify integration tests

#![allow(dead_code)]

pub mod backend;
pub mod db_utils;

pub use backend::{RecordingSleeper, ScriptedBackend};
pub use db_utils::{
    all_labels, create_test_db, create_test_pool, fetch_label, seed_labels, set_classification,
    set_raw_confidence,
};
