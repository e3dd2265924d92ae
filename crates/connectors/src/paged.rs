use crate::{error::ReaderError, reader::RecordReader};
use async_trait::async_trait;
use model::{position::Position, record::Record};
use std::collections::VecDeque;

/// One bounded query per page. Pages are 0-based and at most `size`
/// records; a short page marks the end of the source.
#[async_trait]
pub trait PageFetcher: Send {
    async fn open(&mut self) -> Result<(), ReaderError> {
        Ok(())
    }

    async fn fetch_page(&mut self, page: u64, size: u64) -> Result<Vec<Record>, ReaderError>;

    async fn close(&mut self) -> Result<(), ReaderError> {
        Ok(())
    }
}

/// Drives any `PageFetcher` as a record stream.
///
/// The position tracks the page index plus the intra-page offset of the
/// next unread record, so a resume can land mid-page. Page size is
/// independent of the chunk size the caller accumulates into.
pub struct PagedReader<F: PageFetcher> {
    fetcher: F,
    page_size: u64,
    page: u64,
    slot: u64,
    buffer: VecDeque<Record>,
    /// Set once a fetch returns fewer records than a full page.
    short_page_seen: bool,
    pending_skip: u64,
    done: bool,
    opened: bool,
}

impl<F: PageFetcher> PagedReader<F> {
    pub fn new(fetcher: F, page_size: u64) -> Self {
        PagedReader {
            fetcher,
            page_size: page_size.max(1),
            page: 0,
            slot: 0,
            buffer: VecDeque::new(),
            short_page_seen: false,
            pending_skip: 0,
            done: false,
            opened: false,
        }
    }

    async fn fill(&mut self) -> Result<(), ReaderError> {
        let rows = self.fetcher.fetch_page(self.page, self.page_size).await?;
        let fetched = rows.len() as u64;
        if fetched < self.page_size {
            self.short_page_seen = true;
        }
        let skip = std::mem::take(&mut self.pending_skip);
        if skip > fetched {
            return Err(ReaderError::InvalidPosition(format!(
                "resume slot {skip} is beyond page {} ({fetched} rows)",
                self.page
            )));
        }
        self.buffer = rows.into_iter().skip(skip as usize).collect();
        Ok(())
    }
}

#[async_trait]
impl<F: PageFetcher> RecordReader for PagedReader<F> {
    async fn open(&mut self, resume: Option<Position>) -> Result<(), ReaderError> {
        self.opened = true;
        self.buffer.clear();
        self.short_page_seen = false;
        self.pending_skip = 0;
        self.done = false;

        match resume {
            None | Some(Position::Start) => {
                self.page = 0;
                self.slot = 0;
            }
            Some(Position::Page { page, slot }) => {
                if slot >= self.page_size {
                    return Err(ReaderError::InvalidPosition(format!(
                        "slot {slot} does not fit pages of {}",
                        self.page_size
                    )));
                }
                self.page = page;
                self.slot = slot;
                self.pending_skip = slot;
            }
            Some(Position::Done) => {
                self.done = true;
                return Ok(());
            }
            Some(other) => {
                return Err(ReaderError::InvalidPosition(format!(
                    "paged source cannot resume at {other}"
                )));
            }
        }

        self.fetcher.open().await
    }

    async fn read(&mut self) -> Result<Option<Record>, ReaderError> {
        if !self.opened {
            return Err(ReaderError::NotOpen);
        }
        if self.done {
            return Ok(None);
        }
        if self.buffer.is_empty() {
            if self.short_page_seen {
                self.done = true;
                return Ok(None);
            }
            self.fill().await?;
        }
        let Some(record) = self.buffer.pop_front() else {
            self.done = true;
            return Ok(None);
        };
        self.slot += 1;
        if self.slot >= self.page_size {
            self.page += 1;
            self.slot = 0;
        }
        Ok(Some(record))
    }

    fn position(&self) -> Position {
        if self.done {
            Position::Done
        } else if self.page == 0 && self.slot == 0 {
            Position::Start
        } else {
            Position::page(self.page, self.slot)
        }
    }

    async fn close(&mut self) -> Result<(), ReaderError> {
        self.buffer.clear();
        self.fetcher.close().await
    }
}

/// Pages served from a vector, for wiring static data through the paged
/// driver and for exercising it in tests.
pub struct VecPageFetcher {
    records: Vec<Record>,
}

impl VecPageFetcher {
    pub fn new(records: Vec<Record>) -> Self {
        VecPageFetcher { records }
    }
}

#[async_trait]
impl PageFetcher for VecPageFetcher {
    async fn fetch_page(&mut self, page: u64, size: u64) -> Result<Vec<Record>, ReaderError> {
        let start = (page * size) as usize;
        let end = start.saturating_add(size as usize).min(self.records.len());
        if start >= self.records.len() {
            return Ok(Vec::new());
        }
        Ok(self.records[start..end].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::value::Value;

    fn recs(n: i64) -> Vec<Record> {
        (0..n)
            .map(|i| Record::with_fields("t", vec![("id".to_string(), Value::Int(i))]))
            .collect()
    }

    #[tokio::test]
    async fn pages_stream_in_order_with_positions() {
        let mut reader = PagedReader::new(VecPageFetcher::new(recs(5)), 2);
        reader.open(None).await.unwrap();

        let mut seen = Vec::new();
        let mut positions = Vec::new();
        while let Some(record) = reader.read().await.unwrap() {
            seen.push(record.value("id").as_i64().unwrap());
            positions.push(reader.position());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(
            positions,
            vec![
                Position::page(0, 1),
                Position::page(1, 0),
                Position::page(1, 1),
                Position::page(2, 0),
                Position::page(2, 1),
            ]
        );
        assert_eq!(reader.position(), Position::Done);
    }

    #[tokio::test]
    async fn resume_lands_mid_page() {
        let mut reader = PagedReader::new(VecPageFetcher::new(recs(5)), 2);
        reader.open(Some(Position::page(1, 1))).await.unwrap();

        let record = reader.read().await.unwrap().unwrap();
        assert_eq!(record.value("id"), Value::Int(3));
    }

    #[tokio::test]
    async fn exact_multiple_ends_after_empty_page() {
        let mut reader = PagedReader::new(VecPageFetcher::new(recs(4)), 2);
        reader.open(None).await.unwrap();
        let mut count = 0;
        while reader.read().await.unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
        assert_eq!(reader.position(), Position::Done);
    }
}
