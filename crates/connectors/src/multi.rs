use crate::{error::ReaderError, reader::RecordReader};
use async_trait::async_trait;
use model::{position::Position, record::Record};

/// Presents an ordered list of sub-readers as one logical stream.
///
/// Resources are consumed strictly in order; the position records which
/// sub-reader is active plus the delegate's own position, so a resume
/// skips fully-consumed resources without touching them.
pub struct MultiReader {
    readers: Vec<Box<dyn RecordReader>>,
    active: usize,
    opened: bool,
    done: bool,
}

impl MultiReader {
    pub fn new(readers: Vec<Box<dyn RecordReader>>) -> Self {
        MultiReader {
            readers,
            active: 0,
            opened: false,
            done: false,
        }
    }
}

#[async_trait]
impl RecordReader for MultiReader {
    async fn open(&mut self, resume: Option<Position>) -> Result<(), ReaderError> {
        self.opened = true;
        self.done = false;

        let (index, inner) = match resume {
            None | Some(Position::Start) => (0, None),
            Some(Position::Resource { index, inner }) => (index as usize, Some(*inner)),
            Some(Position::Done) => {
                self.done = true;
                return Ok(());
            }
            Some(other) => {
                return Err(ReaderError::InvalidPosition(format!(
                    "multi-resource source cannot resume at {other}"
                )));
            }
        };

        if self.readers.is_empty() {
            self.done = true;
            return Ok(());
        }
        if index >= self.readers.len() {
            return Err(ReaderError::InvalidPosition(format!(
                "resume resource {index} is beyond the {} configured resources",
                self.readers.len()
            )));
        }

        self.active = index;
        self.readers[self.active].open(inner).await
    }

    async fn read(&mut self) -> Result<Option<Record>, ReaderError> {
        if !self.opened {
            return Err(ReaderError::NotOpen);
        }
        if self.done {
            return Ok(None);
        }
        loop {
            if self.active >= self.readers.len() {
                self.done = true;
                return Ok(None);
            }
            match self.readers[self.active].read().await? {
                Some(record) => return Ok(Some(record)),
                None => {
                    self.readers[self.active].close().await?;
                    self.active += 1;
                    if self.active < self.readers.len() {
                        self.readers[self.active].open(None).await?;
                    }
                }
            }
        }
    }

    fn position(&self) -> Position {
        if self.done || self.active >= self.readers.len() {
            return Position::Done;
        }
        let inner = self.readers[self.active].position();
        if self.active == 0 && inner.is_start() {
            return Position::Start;
        }
        Position::resource(self.active as u64, inner)
    }

    async fn close(&mut self) -> Result<(), ReaderError> {
        let mut first_err = None;
        for reader in &mut self.readers {
            if let Err(err) = reader.close().await
                && first_err.is_none()
            {
                first_err = Some(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
