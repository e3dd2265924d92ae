use connectors::error::{ReaderError, WriterError};
use engine_core::error::StateStoreError;
use thiserror::Error;

/// Top-level errors for a step run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No step with the requested name is registered.
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    /// The run identity already finished successfully and `force` was not set.
    #[error("Step '{step}' already completed for token '{token}'")]
    AlreadyCompleted { step: String, token: String },

    /// Source-side failure.
    #[error("Read error: {0}")]
    Read(#[from] ReaderError),

    /// A record could not be transformed and the skip budget was exhausted.
    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    /// Sink-side failure after any configured retries.
    #[error("Write error: {0}")]
    Write(#[from] WriterError),

    /// State store failure. Always fatal: progress must be durable.
    #[error("State store error: {0}")]
    State(#[from] StateStoreError),
}

/// Failure to transform a single record.
///
/// Skippable errors consume the step's skip budget; fatal ones abort the
/// run immediately regardless of budget.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
    pub skippable: bool,
}

impl TransformError {
    pub fn fatal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            skippable: false,
        }
    }

    pub fn skippable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            skippable: true,
        }
    }
}
