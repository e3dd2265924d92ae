use crate::{
    error::{ReaderError, WriterError},
    reader::RecordReader,
    writer::RecordWriter,
};
use async_trait::async_trait;
use model::{position::Position, record::Record};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

/// Static in-memory source.
///
/// The records have no durable identity outside the process, so positions
/// are coarse: `Start` until the source is exhausted, then `Done`.
/// Resuming at any non-`Done` position replays from the beginning.
pub struct VecReader {
    records: Vec<Record>,
    idx: usize,
    done: bool,
    opened: bool,
}

impl VecReader {
    pub fn new(records: Vec<Record>) -> Self {
        VecReader {
            records,
            idx: 0,
            done: false,
            opened: false,
        }
    }
}

#[async_trait]
impl RecordReader for VecReader {
    async fn open(&mut self, resume: Option<Position>) -> Result<(), ReaderError> {
        self.opened = true;
        self.idx = 0;
        self.done = false;
        match resume {
            Some(Position::Done) => self.done = true,
            Some(pos) if !pos.is_start() => {
                warn!(position = %pos, "In-memory source cannot seek, replaying from the start.");
            }
            _ => {}
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>, ReaderError> {
        if !self.opened {
            return Err(ReaderError::NotOpen);
        }
        if self.done {
            return Ok(None);
        }
        match self.records.get(self.idx) {
            Some(record) => {
                self.idx += 1;
                Ok(Some(record.clone()))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }

    fn position(&self) -> Position {
        if self.done {
            Position::Done
        } else {
            Position::Start
        }
    }

    async fn close(&mut self) -> Result<(), ReaderError> {
        Ok(())
    }
}

/// In-memory sink with a shared buffer, one entry per written chunk.
///
/// The buffer is shared through an `Arc` so a caller can keep a handle
/// across writer instances; `fail_on_chunk` injects a failure before the
/// nth write of an instance to exercise failure paths.
pub struct VecWriter {
    chunks: Arc<Mutex<Vec<Vec<Record>>>>,
    fail_on_chunk: Option<u64>,
    chunks_written: u64,
    opened: bool,
}

impl VecWriter {
    pub fn new() -> Self {
        Self::with_sink(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn with_sink(chunks: Arc<Mutex<Vec<Vec<Record>>>>) -> Self {
        VecWriter {
            chunks,
            fail_on_chunk: None,
            chunks_written: 0,
            opened: false,
        }
    }

    pub fn fail_on_chunk(mut self, nth: u64) -> Self {
        self.fail_on_chunk = Some(nth);
        self
    }

    /// Handle to the shared chunk buffer.
    pub fn sink(&self) -> Arc<Mutex<Vec<Vec<Record>>>> {
        Arc::clone(&self.chunks)
    }
}

impl Default for VecWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordWriter for VecWriter {
    async fn open(&mut self) -> Result<(), WriterError> {
        self.opened = true;
        Ok(())
    }

    async fn write(&mut self, records: &[Record]) -> Result<u64, WriterError> {
        if !self.opened {
            return Err(WriterError::NotOpen);
        }
        if self.fail_on_chunk == Some(self.chunks_written) {
            return Err(WriterError::Rejected(format!(
                "injected failure before chunk write {}",
                self.chunks_written
            )));
        }
        self.chunks.lock().await.push(records.to_vec());
        self.chunks_written += 1;
        Ok(records.len() as u64)
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::value::Value;

    fn rec(id: i64) -> Record {
        Record::with_fields("t", vec![("id".to_string(), Value::Int(id))])
    }

    #[tokio::test]
    async fn positions_are_coarse() {
        let mut reader = VecReader::new(vec![rec(1), rec(2)]);
        reader.open(None).await.unwrap();
        assert_eq!(reader.position(), Position::Start);

        reader.read().await.unwrap().unwrap();
        // Still `Start`: a partially-consumed in-memory source checkpoints
        // as not-yet-consumed.
        assert_eq!(reader.position(), Position::Start);

        reader.read().await.unwrap().unwrap();
        assert!(reader.read().await.unwrap().is_none());
        assert_eq!(reader.position(), Position::Done);
    }

    #[tokio::test]
    async fn resume_done_skips_everything() {
        let mut reader = VecReader::new(vec![rec(1)]);
        reader.open(Some(Position::Done)).await.unwrap();
        assert!(reader.read().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writer_fails_on_requested_chunk() {
        let mut writer = VecWriter::new().fail_on_chunk(1);
        writer.open().await.unwrap();
        writer.write(&[rec(1)]).await.unwrap();
        let err = writer.write(&[rec(2)]).await.unwrap_err();
        assert!(matches!(err, WriterError::Rejected(_)));

        let chunks = writer.sink();
        assert_eq!(chunks.lock().await.len(), 1);
    }
}
