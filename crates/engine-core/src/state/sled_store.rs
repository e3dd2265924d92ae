use crate::{
    error::StateStoreError,
    state::{
        StateStore,
        models::{Checkpoint, RunRecord, StepRunId},
    },
};
use async_trait::async_trait;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use tracing::debug;

pub struct SledStateStore {
    db: sled::Db,
}

impl SledStateStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path.as_ref()).map_err(|source| StateStoreError::Open {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Ok(Self { db })
    }

    #[inline]
    fn chk_key(id: &StepRunId) -> String {
        format!("chk:{}", id.key())
    }

    #[inline]
    fn run_key(id: &StepRunId) -> String {
        format!("run:{}", id.key())
    }
}

#[async_trait]
impl StateStore for SledStateStore {
    async fn save_checkpoint(&self, id: &StepRunId, cp: &Checkpoint) -> Result<(), StateStoreError> {
        let key = Self::chk_key(id);
        let new_bytes = bincode::serialize(cp)?;

        // Atomic check-then-set: a stale writer must never move the
        // checkpoint backwards.
        let result = self
            .db
            .transaction::<_, _, StateStoreError>(|tx_db| {
                if let Some(existing_bytes) = tx_db.get(&key)? {
                    let existing: Checkpoint = bincode::deserialize(&existing_bytes)
                        .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                    if cp.chunks_committed < existing.chunks_committed {
                        // Behind what is already durable; skip, not an error.
                        return Ok(false);
                    }
                }
                tx_db.insert(key.as_str(), new_bytes.as_slice())?;
                Ok(true)
            });

        let written = match result {
            Ok(written) => written,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        };
        if !written {
            debug!(
                step = %id.step,
                chunks = cp.chunks_committed,
                "Stale checkpoint ignored, durable state is newer."
            );
            return Ok(());
        }

        self.db.flush_async().await?;
        Ok(())
    }

    async fn load_checkpoint(&self, id: &StepRunId) -> Result<Option<Checkpoint>, StateStoreError> {
        match self.db.get(Self::chk_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn clear_checkpoint(&self, id: &StepRunId) -> Result<(), StateStoreError> {
        self.db.remove(Self::chk_key(id))?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn save_run(&self, id: &StepRunId, record: &RunRecord) -> Result<(), StateStoreError> {
        let bytes = bincode::serialize(record)?;
        self.db.insert(Self::run_key(id), bytes)?;
        self.db.flush_async().await?;
        Ok(())
    }

    async fn load_run(&self, id: &StepRunId) -> Result<Option<RunRecord>, StateStoreError> {
        match self.db.get(Self::run_key(id))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_runs(&self, step: &str) -> Result<Vec<RunRecord>, StateStoreError> {
        let mut records = Vec::new();
        for item in self.db.scan_prefix("run:") {
            let (_key, value) = item?;
            let record: RunRecord = bincode::deserialize(&value)?;
            if record.step == step {
                records.push(record);
            }
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::{
        position::Position,
        run::{RunOutcome, RunStatus},
    };
    use tempfile::tempdir;

    fn mk_cp(chunks: u64, position: Position) -> Checkpoint {
        Checkpoint {
            position,
            chunks_committed: chunks,
            records_read: chunks * 2,
            records_written: chunks * 2,
            records_skipped: 0,
            updated_at: Utc::now(),
        }
    }

    fn mk_run(step: &str, token: &str, status: RunStatus) -> RunRecord {
        RunRecord {
            step: step.to_string(),
            token: token.to_string(),
            outcome: RunOutcome {
                status,
                records_read: 5,
                records_written: 5,
                chunks_committed: 3,
                records_skipped: 0,
                error: None,
                started_at: Utc::now(),
                finished_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn checkpoint_survives_reopen() {
        let dir = tempdir().unwrap();
        let id = StepRunId::new("import", "t1");

        {
            let store = SledStateStore::open(dir.path()).unwrap();
            store
                .save_checkpoint(&id, &mk_cp(2, Position::row(4)))
                .await
                .unwrap();
        }

        let store = SledStateStore::open(dir.path()).unwrap();
        let cp = store.load_checkpoint(&id).await.unwrap().unwrap();
        assert_eq!(cp.chunks_committed, 2);
        assert_eq!(cp.position, Position::row(4));
    }

    #[tokio::test]
    async fn stale_checkpoint_does_not_regress() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        let id = StepRunId::new("import", "t1");

        store
            .save_checkpoint(&id, &mk_cp(3, Position::row(6)))
            .await
            .unwrap();
        store
            .save_checkpoint(&id, &mk_cp(1, Position::row(2)))
            .await
            .unwrap();

        let cp = store.load_checkpoint(&id).await.unwrap().unwrap();
        assert_eq!(cp.chunks_committed, 3);
        assert_eq!(cp.position, Position::row(6));
    }

    #[tokio::test]
    async fn runs_are_listed_per_step() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();

        store
            .save_run(
                &StepRunId::new("import", "t1"),
                &mk_run("import", "t1", RunStatus::Completed),
            )
            .await
            .unwrap();
        store
            .save_run(
                &StepRunId::new("import", "t2"),
                &mk_run("import", "t2", RunStatus::Failed),
            )
            .await
            .unwrap();
        store
            .save_run(
                &StepRunId::new("other", "t1"),
                &mk_run("other", "t1", RunStatus::Completed),
            )
            .await
            .unwrap();

        let runs = store.list_runs("import").await.unwrap();
        assert_eq!(runs.len(), 2);
        assert!(runs.iter().all(|r| r.step == "import"));
    }

    #[tokio::test]
    async fn clear_checkpoint_forgets_position() {
        let dir = tempdir().unwrap();
        let store = SledStateStore::open(dir.path()).unwrap();
        let id = StepRunId::new("import", "t1");

        store
            .save_checkpoint(&id, &mk_cp(1, Position::row(2)))
            .await
            .unwrap();
        store.clear_checkpoint(&id).await.unwrap();
        assert!(store.load_checkpoint(&id).await.unwrap().is_none());
    }
}
