//! # pstag Common Library
//!
//! Shared code for the tag classification pipeline including:
//! - The closed two-level taxonomy (main category + subcategory)
//! - Label store model and schema initialisation
//! - Configuration loading (TOML + environment)
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod taxonomy;

pub use error::{Error, Result};
pub use taxonomy::{MainCategory, Taxonomy};
