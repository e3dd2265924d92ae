use crate::{position::Position, record::Record};
use chrono::{DateTime, Utc};

/// One transactional unit of work: the records written together plus the
/// position to checkpoint once the write commits. The final chunk of a
/// run may hold fewer records than the configured chunk size.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    /// 0-based ordinal of this chunk within the run.
    pub seq: u64,
    pub records: Vec<Record>,
    /// Source position after the last record covered by this chunk,
    /// including any records the transform filtered out.
    pub end: Position,
    pub ts: DateTime<Utc>,
}

impl Chunk {
    pub fn seal(seq: u64, records: Vec<Record>, end: Position) -> Self {
        let id = make_chunk_id(seq, &records, &end);
        Chunk {
            id,
            seq,
            records,
            end,
            ts: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

fn make_chunk_id(seq: u64, records: &[Record], end: &Position) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&seq.to_le_bytes());
    for record in records {
        hasher.update(&record.canonical_bytes());
    }
    hasher.update(format!("{end:?}").as_bytes());
    let hex = hasher.finalize().to_hex();
    format!("chk-{}", &hex.as_str()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn rec(name: &str) -> Record {
        Record::with_fields("t", vec![("name".to_string(), Value::from(name))])
    }

    #[test]
    fn id_is_stable_for_same_content() {
        let a = Chunk::seal(0, vec![rec("a"), rec("b")], Position::row(2));
        let b = Chunk::seal(0, vec![rec("a"), rec("b")], Position::row(2));
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn id_changes_with_position() {
        let a = Chunk::seal(0, vec![rec("a")], Position::row(1));
        let b = Chunk::seal(0, vec![rec("a")], Position::row(2));
        assert_ne!(a.id, b.id);
    }
}
