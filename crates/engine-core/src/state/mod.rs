use crate::{
    error::StateStoreError,
    state::models::{Checkpoint, RunRecord, StepRunId},
};
use async_trait::async_trait;

pub mod memory;
pub mod models;
pub mod sled_store;

/// Durable home of checkpoints and run records, keyed by run identity.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist the checkpoint for a run. Implementations must ignore
    /// writes that would move the checkpoint backwards.
    async fn save_checkpoint(&self, id: &StepRunId, cp: &Checkpoint) -> Result<(), StateStoreError>;

    async fn load_checkpoint(&self, id: &StepRunId) -> Result<Option<Checkpoint>, StateStoreError>;

    /// Drop the checkpoint so the next run starts from scratch.
    async fn clear_checkpoint(&self, id: &StepRunId) -> Result<(), StateStoreError>;

    async fn save_run(&self, id: &StepRunId, record: &RunRecord) -> Result<(), StateStoreError>;

    async fn load_run(&self, id: &StepRunId) -> Result<Option<RunRecord>, StateStoreError>;

    /// Every recorded run of the named step, any token.
    async fn list_runs(&self, step: &str) -> Result<Vec<RunRecord>, StateStoreError>;
}
