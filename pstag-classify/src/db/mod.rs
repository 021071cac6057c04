//! Label store access for the pipeline

pub mod checkpoints;
pub mod labels;
pub mod retry;
pub mod runs;

pub use labels::{Assignment, Coverage, UsageCursor};
pub use retry::retry_on_lock;
