use crate::{error::WriterError, file::json::value_to_json, writer::RecordWriter};
use async_trait::async_trait;
use model::record::Record;
use serde_json::Value as JsonValue;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::PathBuf,
};

/// Appends one JSON object per record, flushed per chunk. The flush makes
/// a committed chunk durable on the happy path, but there is no
/// transactional guarantee against torn writes from a crash mid-chunk.
pub struct JsonLinesWriter {
    path: PathBuf,
    append: bool,
    file: Option<BufWriter<File>>,
}

impl JsonLinesWriter {
    pub fn new(path: impl Into<PathBuf>, append: bool) -> Self {
        JsonLinesWriter {
            path: path.into(),
            append,
            file: None,
        }
    }
}

fn record_to_json(record: &Record) -> JsonValue {
    let mut object = serde_json::Map::new();
    for field in &record.fields {
        object.insert(field.name.clone(), value_to_json(&field.value));
    }
    JsonValue::Object(object)
}

#[async_trait]
impl RecordWriter for JsonLinesWriter {
    async fn open(&mut self) -> Result<(), WriterError> {
        let mut options = OpenOptions::new();
        options.create(true).write(true);
        if self.append {
            options.append(true);
        } else {
            options.truncate(true);
        }
        self.file = Some(BufWriter::new(options.open(&self.path)?));
        Ok(())
    }

    async fn write(&mut self, records: &[Record]) -> Result<u64, WriterError> {
        let file = self.file.as_mut().ok_or(WriterError::NotOpen)?;
        for record in records {
            serde_json::to_writer(&mut *file, &record_to_json(record))?;
            file.write_all(b"\n")?;
        }
        file.flush()?;
        Ok(records.len() as u64)
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::value::Value;

    #[tokio::test]
    async fn writes_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jsonl");

        let mut writer = JsonLinesWriter::new(&path, false);
        writer.open().await.unwrap();
        let records = vec![
            Record::with_fields("t", vec![("id".to_string(), Value::Int(1))]),
            Record::with_fields("t", vec![("id".to_string(), Value::Int(2))]),
        ];
        assert_eq!(writer.write(&records).await.unwrap(), 2);
        writer.close().await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"id":1}"#);
    }
}
