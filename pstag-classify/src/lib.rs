//! pstag-classify library interface
//!
//! Classification pipeline for image-board tag vocabularies: rule engine,
//! external classifier adapter, adaptive batching, checkpoints, consistency
//! repair and the run orchestrator. Exposed as a library for integration tests.

pub mod batch_adjuster;
pub mod checkpoint;
pub mod config;
pub mod db;
pub mod error;
pub mod external;
pub mod models;
pub mod orchestrator;
pub mod repair;
pub mod rules;

pub use crate::config::PipelineConfig;
pub use crate::error::{ClassifierError, PipelineError, PipelineResult};
pub use crate::orchestrator::{Orchestrator, RunReport, RunRequest};
