use crate::value::Value;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// A single data item flowing through a step: the entity it belongs to
/// plus its fields in source order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    pub entity: String,
    pub fields: Vec<Field>,
}

impl Record {
    pub fn new(entity: &str) -> Self {
        Record {
            entity: entity.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with_fields(entity: &str, fields: Vec<(String, Value)>) -> Self {
        Record {
            entity: entity.to_string(),
            fields: fields
                .into_iter()
                .map(|(name, value)| Field { name, value })
                .collect(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(field))
            .map(|f| &f.value)
    }

    /// Missing fields read as `Value::Null`.
    pub fn value(&self, field: &str) -> Value {
        self.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Replaces the field if present, appends it otherwise. Field order is
    /// stable so downstream writers see deterministic column order.
    pub fn set(&mut self, field: &str, value: Value) {
        match self
            .fields
            .iter_mut()
            .find(|f| f.name.eq_ignore_ascii_case(field))
        {
            Some(existing) => existing.value = value,
            None => self.fields.push(Field {
                name: field.to_string(),
                value,
            }),
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let idx = self
            .fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(field))?;
        Some(self.fields.remove(idx).value)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Stable byte form used for content hashing.
    pub fn canonical_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_is_case_insensitive() {
        let rec = Record::with_fields(
            "customer",
            vec![("First_Name".to_string(), Value::from("Ada"))],
        );
        assert_eq!(rec.get("first_name"), Some(&Value::from("Ada")));
        assert_eq!(rec.value("missing"), Value::Null);
    }

    #[test]
    fn set_replaces_in_place() {
        let mut rec = Record::with_fields("p", vec![("price".to_string(), Value::Float(10.0))]);
        rec.set("PRICE", Value::Float(9.0));
        assert_eq!(rec.len(), 1);
        assert_eq!(rec.value("price"), Value::Float(9.0));
    }

    #[test]
    fn remove_preserves_remaining_order() {
        let mut rec = Record::with_fields(
            "p",
            vec![
                ("a".to_string(), Value::Int(1)),
                ("b".to_string(), Value::Int(2)),
                ("c".to_string(), Value::Int(3)),
            ],
        );
        assert_eq!(rec.remove("B"), Some(Value::Int(2)));
        assert_eq!(rec.remove("b"), None);
        assert_eq!(rec.field_names(), vec!["a", "c"]);
    }
}
