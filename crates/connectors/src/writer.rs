use crate::error::WriterError;
use async_trait::async_trait;
use model::record::Record;

/// Destination for whole chunks of records.
///
/// `write` covers one chunk inside one transaction where the backend
/// supports transactions: either every record of the slice becomes
/// visible or none does. A write failure is fatal to the run.
#[async_trait]
pub trait RecordWriter: Send {
    async fn open(&mut self) -> Result<(), WriterError>;

    /// Write all records of one chunk; returns rows affected.
    async fn write(&mut self, records: &[Record]) -> Result<u64, WriterError>;

    /// Release resources. Safe to call more than once.
    async fn close(&mut self) -> Result<(), WriterError>;
}
