//! Error types for the pipeline crate

use thiserror::Error;

/// Pipeline-level errors, as opposed to the per-segment filter error
/// taxonomy in [`seis_types::FilterError`].
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A queued task was dropped before it ran (the session interval
    /// changed and the queue was cleared).
    #[error("task dropped before it ran")]
    TaskDropped,

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("generic error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
