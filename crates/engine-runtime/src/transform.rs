use crate::error::TransformError;
use chrono::Utc;
use model::{record::Record, value::Value};

/// Per-record processing applied between source and sink.
///
/// `Ok(Some(_))` passes the record on; `Ok(None)` filters it out of the
/// chunk. Skippable errors consume the step's skip budget, fatal errors
/// abort the run regardless of remaining budget.
pub trait Transform: Send + Sync {
    fn apply(&self, record: Record) -> Result<Option<Record>, TransformError>;
}

/// Pass-through.
#[derive(Debug, Clone, Copy, Default)]
pub struct Identity;

impl Transform for Identity {
    fn apply(&self, record: Record) -> Result<Option<Record>, TransformError> {
        Ok(Some(record))
    }
}

/// Derives `full_name` from `first_name` and `last_name` and stamps the
/// record with the processing time.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullName;

impl Transform for FullName {
    fn apply(&self, mut record: Record) -> Result<Option<Record>, TransformError> {
        let first = record.value("first_name").as_string().unwrap_or_default();
        let last = record.value("last_name").as_string().unwrap_or_default();
        let full = format!("{first} {last}").trim().to_string();
        record.set("full_name", Value::Text(full));
        record.set("processed_at", Value::Timestamp(Utc::now()));
        Ok(Some(record))
    }
}

/// Multiplies a numeric field by a factor. Records without the field
/// (or with a non-numeric value in it) fail as skippable.
#[derive(Debug, Clone)]
pub struct Discount {
    field: String,
    factor: f64,
}

impl Discount {
    pub fn new(field: &str, factor: f64) -> Self {
        Discount {
            field: field.to_string(),
            factor,
        }
    }

    pub fn ten_percent() -> Self {
        Discount::new("price", 0.9)
    }
}

impl Transform for Discount {
    fn apply(&self, mut record: Record) -> Result<Option<Record>, TransformError> {
        let Some(amount) = record.value(&self.field).as_f64() else {
            return Err(TransformError::skippable(format!(
                "Field '{}' is missing or not numeric",
                self.field
            )));
        };
        record.set(&self.field, Value::Float(amount * self.factor));
        Ok(Some(record))
    }
}
