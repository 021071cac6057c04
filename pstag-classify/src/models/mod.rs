//! Pipeline data models

pub mod pipeline_run;

pub use pipeline_run::{Phase, PipelineRun, RunStatus, StatusTransition};
