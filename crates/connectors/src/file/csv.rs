use crate::{error::ReaderError, reader::RecordReader};
use async_trait::async_trait;
use model::{position::Position, record::Record, value::Value};
use std::{fs::File, path::PathBuf};
use tracing::warn;

/// How a delimited file maps to records.
#[derive(Debug, Clone)]
pub struct CsvReaderConfig {
    pub path: PathBuf,
    pub entity: String,
    pub delimiter: u8,
    /// Explicit field names; when `None` the first row is the header.
    pub columns: Option<Vec<String>>,
    /// Leading rows to discard before data, on top of the header row when
    /// `columns` is `None`. With explicit `columns` this is how a header
    /// line present in the file gets skipped.
    pub skip_lines: u64,
    /// Map a missing file to an empty source instead of failing.
    pub tolerant: bool,
}

impl CsvReaderConfig {
    pub fn new(path: impl Into<PathBuf>, entity: &str) -> Self {
        CsvReaderConfig {
            path: path.into(),
            entity: entity.to_string(),
            delimiter: b',',
            columns: None,
            skip_lines: 0,
            tolerant: false,
        }
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }

    pub fn skip_lines(mut self, lines: u64) -> Self {
        self.skip_lines = lines;
        self
    }

    pub fn tolerant(mut self, tolerant: bool) -> Self {
        self.tolerant = tolerant;
        self
    }
}

/// Cursor-streaming reader over a delimited file. Memory use is bounded
/// by one row; resume re-opens the file and skips already-consumed rows.
pub struct CsvReader {
    config: CsvReaderConfig,
    state: Option<OpenState>,
    /// Data rows fully consumed, header and skipped lines excluded.
    offset: u64,
    done: bool,
    opened: bool,
}

struct OpenState {
    iter: csv::StringRecordsIntoIter<File>,
    headers: Vec<String>,
}

impl CsvReader {
    pub fn new(config: CsvReaderConfig) -> Self {
        CsvReader {
            config,
            state: None,
            offset: 0,
            done: false,
            opened: false,
        }
    }

    fn malformed(&self, err: csv::Error) -> ReaderError {
        let line = err.position().map(|p| p.line()).unwrap_or_default();
        ReaderError::Malformed {
            resource: self.config.path.display().to_string(),
            line,
            message: err.to_string(),
        }
    }
}

/// Cells carry no schema, so values are typed by inference: integer,
/// then float, then text; empty cells read as null.
fn infer_value(cell: &str) -> Value {
    let trimmed = cell.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return Value::Int(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        return Value::Float(v);
    }
    Value::Text(trimmed.to_string())
}

#[async_trait]
impl RecordReader for CsvReader {
    async fn open(&mut self, resume: Option<Position>) -> Result<(), ReaderError> {
        self.opened = true;
        self.state = None;
        self.offset = 0;
        self.done = false;

        let target = match resume {
            None | Some(Position::Start) => 0,
            Some(Position::Row { offset }) => offset,
            Some(Position::Done) => {
                self.done = true;
                return Ok(());
            }
            Some(other) => {
                return Err(ReaderError::InvalidPosition(format!(
                    "csv source cannot resume at {other}"
                )));
            }
        };

        let file = match File::open(&self.config.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                if self.config.tolerant {
                    warn!(
                        path = %self.config.path.display(),
                        "Input file missing, treating source as empty."
                    );
                    self.done = true;
                    return Ok(());
                }
                return Err(ReaderError::MissingResource(
                    self.config.path.display().to_string(),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        let reader = csv::ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(false)
            .from_reader(file);
        let mut iter = reader.into_records();

        let headers = match &self.config.columns {
            Some(columns) => columns.clone(),
            None => match iter.next() {
                Some(Ok(row)) => row.iter().map(|h| h.trim().to_string()).collect(),
                Some(Err(err)) => return Err(self.malformed(err)),
                None => {
                    self.done = true;
                    return Ok(());
                }
            },
        };

        for _ in 0..self.config.skip_lines {
            match iter.next() {
                Some(Ok(_)) => {}
                Some(Err(err)) => return Err(self.malformed(err)),
                None => {
                    self.done = true;
                    return Ok(());
                }
            }
        }

        let mut skipped = 0u64;
        while skipped < target {
            match iter.next() {
                Some(Ok(_)) => skipped += 1,
                Some(Err(err)) => return Err(self.malformed(err)),
                None => {
                    return Err(ReaderError::InvalidPosition(format!(
                        "resume offset {target} is beyond the {skipped} data rows in {}",
                        self.config.path.display()
                    )));
                }
            }
        }

        self.offset = target;
        self.state = Some(OpenState { iter, headers });
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>, ReaderError> {
        if !self.opened {
            return Err(ReaderError::NotOpen);
        }
        if self.done {
            return Ok(None);
        }
        let state = self.state.as_mut().ok_or(ReaderError::NotOpen)?;

        match state.iter.next() {
            Some(Ok(row)) => {
                let mut fields = Vec::with_capacity(state.headers.len());
                for (idx, name) in state.headers.iter().enumerate() {
                    let cell = row.get(idx).unwrap_or("");
                    fields.push((name.clone(), infer_value(cell)));
                }
                self.offset += 1;
                Ok(Some(Record::with_fields(&self.config.entity, fields)))
            }
            Some(Err(err)) => Err(self.malformed(err)),
            None => {
                self.done = true;
                self.state = None;
                Ok(None)
            }
        }
    }

    fn position(&self) -> Position {
        if self.done {
            Position::Done
        } else if self.offset == 0 {
            Position::Start
        } else {
            Position::row(self.offset)
        }
    }

    async fn close(&mut self) -> Result<(), ReaderError> {
        self.state = None;
        Ok(())
    }
}
