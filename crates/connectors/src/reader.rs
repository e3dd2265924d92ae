use crate::error::ReaderError;
use async_trait::async_trait;
use model::{position::Position, record::Record};

/// A resumable stream of records.
///
/// Readers hand out one record at a time and report the position after the
/// last record returned, so the caller can checkpoint at any boundary and
/// later reconstruct the reader with `open(Some(position))` to continue
/// from the first unseen record.
#[async_trait]
pub trait RecordReader: Send {
    /// Acquire resources and seek to `resume` when given. Opening at
    /// `Position::Done` is valid and yields immediate exhaustion.
    async fn open(&mut self, resume: Option<Position>) -> Result<(), ReaderError>;

    /// Next record, or `None` once the source is exhausted. Exhaustion is
    /// the normal end of input, not an error.
    async fn read(&mut self) -> Result<Option<Record>, ReaderError>;

    /// Position after the last record returned by `read`.
    fn position(&self) -> Position;

    /// Release resources. Safe to call more than once.
    async fn close(&mut self) -> Result<(), ReaderError>;
}
