use thiserror::Error;

/// Checkpoint and run-record persistence failures. Always fatal to the
/// run: a chunk is only considered done once its checkpoint is durable.
#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Failed to open state store at {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: sled::Error,
    },

    #[error("State backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("State serialization error: {0}")]
    Codec(#[from] bincode::Error),
}
