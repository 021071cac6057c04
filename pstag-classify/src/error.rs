//! Error types for pstag-classify

use thiserror::Error;

/// External classifier call errors
///
/// Transport and parse failures are retryable; `RetriesExhausted` is terminal
/// for the batch that produced it.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Missing API key for the external classifier")]
    MissingApiKey,

    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl ClassifierError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            ClassifierError::Transport(_) | ClassifierError::Parse(_) => true,
            // Client errors other than rate limiting will not improve on retry
            ClassifierError::Api { status, .. } => *status == 429 || *status >= 500,
            ClassifierError::MissingApiKey | ClassifierError::RetriesExhausted { .. } => false,
        }
    }
}

/// Pipeline-level errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Common(#[from] pstag_common::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("No paused run for resume token {0}")]
    InvalidResumeToken(String),
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
