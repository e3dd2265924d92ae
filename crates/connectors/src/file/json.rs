use crate::{error::ReaderError, reader::RecordReader};
use async_trait::async_trait;
use model::{position::Position, record::Record, value::Value};
use serde_json::Value as JsonValue;
use std::{fs::File, io::BufReader, path::PathBuf};
use tracing::warn;

pub(crate) fn json_to_value(value: &JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Bool(*b),
        JsonValue::Number(n) => n
            .as_i64()
            .map(Value::Int)
            .or_else(|| n.as_f64().map(Value::Float))
            .unwrap_or(Value::Null),
        JsonValue::String(s) => Value::Text(s.clone()),
        // Nested arrays and objects stay structured.
        other => Value::Json(other.clone()),
    }
}

pub(crate) fn value_to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Int(v) => JsonValue::from(*v),
        Value::Float(v) => serde_json::Number::from_f64(*v)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Text(s) => JsonValue::String(s.clone()),
        Value::Date(d) => JsonValue::String(d.to_string()),
        Value::Timestamp(ts) => JsonValue::String(ts.to_rfc3339()),
        Value::Uuid(u) => JsonValue::String(u.to_string()),
        Value::Json(v) => v.clone(),
    }
}

#[derive(Debug, Clone)]
pub struct JsonReaderConfig {
    pub path: PathBuf,
    pub entity: String,
    pub tolerant: bool,
}

impl JsonReaderConfig {
    pub fn new(path: impl Into<PathBuf>, entity: &str) -> Self {
        JsonReaderConfig {
            path: path.into(),
            entity: entity.to_string(),
            tolerant: false,
        }
    }

    pub fn tolerant(mut self, tolerant: bool) -> Self {
        self.tolerant = tolerant;
        self
    }
}

/// Reader over a file holding one top-level JSON array of objects. The
/// array is parsed eagerly on open; positions count consumed elements.
pub struct JsonReader {
    config: JsonReaderConfig,
    records: Vec<Record>,
    idx: u64,
    done: bool,
    opened: bool,
}

impl JsonReader {
    pub fn new(config: JsonReaderConfig) -> Self {
        JsonReader {
            config,
            records: Vec::new(),
            idx: 0,
            done: false,
            opened: false,
        }
    }
}

#[async_trait]
impl RecordReader for JsonReader {
    async fn open(&mut self, resume: Option<Position>) -> Result<(), ReaderError> {
        self.opened = true;
        self.records.clear();
        self.idx = 0;
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
                    "json source cannot resume at {other}"
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

        let elements: Vec<JsonValue> = serde_json::from_reader(BufReader::new(file))?;
        let mut records = Vec::with_capacity(elements.len());
        for (idx, element) in elements.iter().enumerate() {
            let object = element.as_object().ok_or_else(|| ReaderError::Malformed {
                resource: self.config.path.display().to_string(),
                line: idx as u64,
                message: "expected a JSON object".to_string(),
            })?;
            let fields = object
                .iter()
                .map(|(name, value)| (name.clone(), json_to_value(value)))
                .collect();
            records.push(Record::with_fields(&self.config.entity, fields));
        }

        if target > records.len() as u64 {
            return Err(ReaderError::InvalidPosition(format!(
                "resume offset {target} is beyond the {} elements in {}",
                records.len(),
                self.config.path.display()
            )));
        }

        self.records = records;
        self.idx = target;
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>, ReaderError> {
        if !self.opened {
            return Err(ReaderError::NotOpen);
        }
        if self.done {
            return Ok(None);
        }
        match self.records.get(self.idx as usize) {
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
        } else if self.idx == 0 {
            Position::Start
        } else {
            Position::row(self.idx)
        }
    }

    async fn close(&mut self) -> Result<(), ReaderError> {
        self.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn reads_array_of_objects() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut file = File::create(&path).unwrap();
        file.write_all(br#"[{"id": 1, "first_name": "Ada"}, {"id": 2, "first_name": "Alan"}]"#)
            .unwrap();

        let mut reader = JsonReader::new(JsonReaderConfig::new(&path, "customer"));
        reader.open(None).await.unwrap();

        let first = reader.read().await.unwrap().unwrap();
        assert_eq!(first.value("id"), Value::Int(1));
        assert_eq!(first.value("first_name"), Value::from("Ada"));

        reader.read().await.unwrap().unwrap();
        assert!(reader.read().await.unwrap().is_none());
        assert_eq!(reader.position(), Position::Done);
    }

    #[tokio::test]
    async fn resume_lands_on_unseen_element() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut file = File::create(&path).unwrap();
        file.write_all(br#"[{"id": 1}, {"id": 2}, {"id": 3}]"#).unwrap();

        let mut reader = JsonReader::new(JsonReaderConfig::new(&path, "customer"));
        reader.open(Some(Position::row(2))).await.unwrap();
        let rec = reader.read().await.unwrap().unwrap();
        assert_eq!(rec.value("id"), Value::Int(3));
    }

    #[tokio::test]
    async fn non_object_element_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.json");
        let mut file = File::create(&path).unwrap();
        file.write_all(br#"[{"id": 1}, 42]"#).unwrap();

        let mut reader = JsonReader::new(JsonReaderConfig::new(&path, "customer"));
        let err = reader.open(None).await.unwrap_err();
        assert!(matches!(err, ReaderError::Malformed { line: 1, .. }));
    }
}
