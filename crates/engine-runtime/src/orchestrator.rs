use crate::{error::EngineError, transform::Transform};
use chrono::Utc;
use connectors::{error::WriterError, reader::RecordReader, writer::RecordWriter};
use engine_core::{
    metrics::Metrics,
    retry::RetryPolicy,
    state::{
        StateStore,
        models::{Checkpoint, StepRunId},
    },
};
use model::{chunk::Chunk, position::Position, record::Record};
use std::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cumulative progress of one run attempt. Counts continue from the
/// starting checkpoint, so a resumed run reports totals, not deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct RunProgress {
    pub position: Position,
    pub chunks_committed: u64,
    pub records_read: u64,
    pub records_written: u64,
    pub records_skipped: u64,
    pub stopped: bool,
}

/// Drives one step's chunk loop: fill a chunk from the reader through
/// the transform, hand it to the writer as one transaction, persist the
/// checkpoint, repeat until the source is exhausted.
///
/// The checkpoint is saved after the sink commit. A crash between the
/// two replays exactly one chunk on resume; sinks that cannot absorb
/// the replay (plain appends) may duplicate that chunk.
pub struct ChunkOrchestrator {
    chunk_size: usize,
    skip_limit: u32,
    retry: RetryPolicy,
    metrics: Metrics,
    cancel: CancellationToken,
}

impl ChunkOrchestrator {
    pub fn new(chunk_size: usize, skip_limit: u32, retry: RetryPolicy) -> Self {
        ChunkOrchestrator {
            chunk_size: chunk_size.max(1),
            skip_limit,
            retry,
            metrics: Metrics::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn metrics(&self) -> Metrics {
        self.metrics.clone()
    }

    /// Runs the loop from `start` until exhaustion, cancellation or
    /// failure. The reader and writer must already be open.
    pub async fn run(
        &self,
        id: &StepRunId,
        start: Checkpoint,
        reader: &mut dyn RecordReader,
        transform: &dyn Transform,
        writer: &mut dyn RecordWriter,
        store: &dyn StateStore,
    ) -> Result<RunProgress, EngineError> {
        let mut state = start;
        let mut skipped_this_attempt: u32 = 0;
        let mut stopped = false;

        loop {
            // Cancellation is honored only here, so a stop always lands
            // on a committed chunk boundary.
            if self.cancel.is_cancelled() {
                info!(step = %id.step, "Cancellation observed at chunk boundary, stopping.");
                stopped = true;
                break;
            }

            let (records, read, skipped) = self
                .fill_chunk(id, reader, transform, &mut skipped_this_attempt)
                .await?;

            state.records_read += read;
            state.records_skipped += skipped;
            self.metrics.add_read(read);
            self.metrics.add_skipped(skipped);

            if records.is_empty() {
                // Source exhausted. Trailing reads that were all dropped
                // or skipped still advance the terminal position below.
                break;
            }

            let end = reader.position();
            let seq = state.chunks_committed;
            let chunk = Chunk::seal(seq, records, end.clone());
            let started = Instant::now();

            self.write_chunk(id, writer, &chunk).await?;

            state.records_written += chunk.len() as u64;
            state.chunks_committed += 1;
            state.position = end;
            state.updated_at = Utc::now();
            store.save_checkpoint(id, &state).await?;

            self.metrics.add_written(chunk.len() as u64);
            self.metrics.add_chunk();

            info!(
                step = %id.step,
                chunk = seq,
                chunk_id = %chunk.id,
                rows = chunk.len(),
                duration_ms = started.elapsed().as_millis() as u64,
                position = %state.position,
                "Chunk committed."
            );
        }

        if !stopped {
            let terminal = reader.position();
            if terminal.is_done() {
                state.position = terminal;
                state.updated_at = Utc::now();
                store.save_checkpoint(id, &state).await?;
            }
        }

        Ok(RunProgress {
            position: state.position,
            chunks_committed: state.chunks_committed,
            records_read: state.records_read,
            records_written: state.records_written,
            records_skipped: state.records_skipped,
            stopped,
        })
    }

    /// Reads until `chunk_size` records survive the transform or the
    /// source is exhausted. Returns the survivors plus how many records
    /// were read and how many were skipped along the way.
    async fn fill_chunk(
        &self,
        id: &StepRunId,
        reader: &mut dyn RecordReader,
        transform: &dyn Transform,
        skipped_this_attempt: &mut u32,
    ) -> Result<(Vec<Record>, u64, u64), EngineError> {
        let mut records = Vec::with_capacity(self.chunk_size);
        let mut read = 0u64;
        let mut skipped = 0u64;

        while records.len() < self.chunk_size {
            let Some(record) = reader.read().await? else {
                break;
            };
            read += 1;

            match transform.apply(record) {
                Ok(Some(transformed)) => records.push(transformed),
                Ok(None) => {
                    // Dropped by the transform: not an error, not written.
                }
                Err(err) if err.skippable && *skipped_this_attempt < self.skip_limit => {
                    *skipped_this_attempt += 1;
                    skipped += 1;
                    warn!(
                        step = %id.step,
                        skipped = *skipped_this_attempt,
                        limit = self.skip_limit,
                        error = %err,
                        "Record skipped."
                    );
                }
                Err(err) => return Err(EngineError::Transform(err)),
            }
        }

        Ok((records, read, skipped))
    }

    /// One sink transaction per chunk, with optional bounded retries for
    /// transient database and IO failures.
    async fn write_chunk(
        &self,
        id: &StepRunId,
        writer: &mut dyn RecordWriter,
        chunk: &Chunk,
    ) -> Result<(), EngineError> {
        let mut attempt = 0usize;

        loop {
            match writer.write(&chunk.records).await {
                Ok(rows) => {
                    if rows != chunk.len() as u64 {
                        debug!(
                            step = %id.step,
                            chunk = chunk.seq,
                            rows,
                            "Sink reported a different affected-row count."
                        );
                    }
                    return Ok(());
                }
                Err(err) => {
                    let transient = matches!(err, WriterError::Db(_) | WriterError::Io(_));
                    if !transient || attempt + 1 >= self.retry.max_attempts {
                        return Err(EngineError::Write(err));
                    }

                    let delay = self.retry.backoff_delay(attempt);
                    attempt += 1;
                    self.metrics.add_retry();
                    warn!(
                        step = %id.step,
                        chunk = chunk.seq,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Chunk write failed, retrying."
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransformError;
    use connectors::memory::{VecReader, VecWriter};
    use engine_core::state::memory::MemoryStateStore;
    use model::value::Value;

    fn rec(id: i64) -> Record {
        Record::with_fields("t", vec![("id".to_string(), Value::Int(id))])
    }

    fn records(n: i64) -> Vec<Record> {
        (1..=n).map(rec).collect()
    }

    struct DropOdd;

    impl Transform for DropOdd {
        fn apply(&self, record: Record) -> Result<Option<Record>, TransformError> {
            match record.value("id").as_i64() {
                Some(id) if id % 2 == 1 => Ok(None),
                _ => Ok(Some(record)),
            }
        }
    }

    struct FailOn(i64);

    impl Transform for FailOn {
        fn apply(&self, record: Record) -> Result<Option<Record>, TransformError> {
            if record.value("id").as_i64() == Some(self.0) {
                Err(TransformError::skippable("bad record"))
            } else {
                Ok(Some(record))
            }
        }
    }

    async fn run_once(
        orchestrator: &ChunkOrchestrator,
        source: Vec<Record>,
        transform: &dyn Transform,
        writer: &mut VecWriter,
        store: &MemoryStateStore,
    ) -> Result<RunProgress, EngineError> {
        let id = StepRunId::new("test-step", "t0");
        let mut reader = VecReader::new(source);
        reader.open(None).await.unwrap();
        writer.open().await.unwrap();
        orchestrator
            .run(
                &id,
                Checkpoint::initial(),
                &mut reader,
                transform,
                writer,
                store,
            )
            .await
    }

    #[tokio::test]
    async fn five_records_chunk_two_commits_three_chunks() {
        let orchestrator = ChunkOrchestrator::new(2, 0, RetryPolicy::default());
        let mut writer = VecWriter::new();
        let store = MemoryStateStore::new();

        let progress = run_once(
            &orchestrator,
            records(5),
            &crate::transform::Identity,
            &mut writer,
            &store,
        )
        .await
        .unwrap();

        assert_eq!(progress.chunks_committed, 3);
        assert_eq!(progress.records_read, 5);
        assert_eq!(progress.records_written, 5);
        assert_eq!(progress.position, Position::Done);
        assert!(!progress.stopped);

        let sink = writer.sink();
        let chunks = sink.lock().await;
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn dropped_records_do_not_reach_the_sink() {
        let orchestrator = ChunkOrchestrator::new(2, 0, RetryPolicy::default());
        let mut writer = VecWriter::new();
        let store = MemoryStateStore::new();

        let progress = run_once(&orchestrator, records(5), &DropOdd, &mut writer, &store)
            .await
            .unwrap();

        assert_eq!(progress.records_read, 5);
        assert_eq!(progress.records_written, 2);
        assert_eq!(progress.chunks_committed, 1);

        let sink = writer.sink();
        let chunks = sink.lock().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 2);
    }

    #[tokio::test]
    async fn skip_budget_absorbs_failures_up_to_the_limit() {
        let orchestrator = ChunkOrchestrator::new(2, 1, RetryPolicy::default());
        let mut writer = VecWriter::new();
        let store = MemoryStateStore::new();

        let progress = run_once(&orchestrator, records(4), &FailOn(2), &mut writer, &store)
            .await
            .unwrap();

        assert_eq!(progress.records_read, 4);
        assert_eq!(progress.records_skipped, 1);
        assert_eq!(progress.records_written, 3);
    }

    #[tokio::test]
    async fn skip_budget_exhaustion_fails_the_run() {
        let orchestrator = ChunkOrchestrator::new(10, 0, RetryPolicy::default());
        let mut writer = VecWriter::new();
        let store = MemoryStateStore::new();

        let err = run_once(&orchestrator, records(3), &FailOn(2), &mut writer, &store)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Transform(_)));
    }

    #[tokio::test]
    async fn empty_source_completes_with_zero_counts() {
        let orchestrator = ChunkOrchestrator::new(2, 0, RetryPolicy::default());
        let mut writer = VecWriter::new();
        let store = MemoryStateStore::new();

        let progress = run_once(
            &orchestrator,
            Vec::new(),
            &crate::transform::Identity,
            &mut writer,
            &store,
        )
        .await
        .unwrap();

        assert_eq!(progress.chunks_committed, 0);
        assert_eq!(progress.records_written, 0);
        assert_eq!(progress.position, Position::Done);

        let sink = writer.sink();
        assert!(sink.lock().await.is_empty());
    }

    #[tokio::test]
    async fn pre_cancelled_token_stops_before_reading() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let orchestrator =
            ChunkOrchestrator::new(2, 0, RetryPolicy::default()).with_cancel(cancel);
        let mut writer = VecWriter::new();
        let store = MemoryStateStore::new();

        let progress = run_once(
            &orchestrator,
            records(4),
            &crate::transform::Identity,
            &mut writer,
            &store,
        )
        .await
        .unwrap();

        assert!(progress.stopped);
        assert_eq!(progress.records_read, 0);
        let sink = writer.sink();
        assert!(sink.lock().await.is_empty());
    }
}
