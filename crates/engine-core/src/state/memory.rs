use crate::{
    error::StateStoreError,
    state::{
        StateStore,
        models::{Checkpoint, RunRecord, StepRunId},
    },
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Volatile store for tests and dry wiring. Mirrors the sled store's
/// monotonicity guard so orchestration code behaves identically.
#[derive(Default)]
pub struct MemoryStateStore {
    checkpoints: RwLock<HashMap<String, Checkpoint>>,
    runs: RwLock<HashMap<String, RunRecord>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn save_checkpoint(&self, id: &StepRunId, cp: &Checkpoint) -> Result<(), StateStoreError> {
        let mut checkpoints = self.checkpoints.write().await;
        if let Some(existing) = checkpoints.get(&id.key())
            && cp.chunks_committed < existing.chunks_committed
        {
            debug!(
                step = %id.step,
                chunks = cp.chunks_committed,
                "Stale checkpoint ignored, stored state is newer."
            );
            return Ok(());
        }
        checkpoints.insert(id.key(), cp.clone());
        Ok(())
    }

    async fn load_checkpoint(&self, id: &StepRunId) -> Result<Option<Checkpoint>, StateStoreError> {
        Ok(self.checkpoints.read().await.get(&id.key()).cloned())
    }

    async fn clear_checkpoint(&self, id: &StepRunId) -> Result<(), StateStoreError> {
        self.checkpoints.write().await.remove(&id.key());
        Ok(())
    }

    async fn save_run(&self, id: &StepRunId, record: &RunRecord) -> Result<(), StateStoreError> {
        self.runs.write().await.insert(id.key(), record.clone());
        Ok(())
    }

    async fn load_run(&self, id: &StepRunId) -> Result<Option<RunRecord>, StateStoreError> {
        Ok(self.runs.read().await.get(&id.key()).cloned())
    }

    async fn list_runs(&self, step: &str) -> Result<Vec<RunRecord>, StateStoreError> {
        Ok(self
            .runs
            .read()
            .await
            .values()
            .filter(|record| record.step == step)
            .cloned()
            .collect())
    }
}
