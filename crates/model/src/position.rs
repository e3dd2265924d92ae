use serde::{Deserialize, Serialize};
use std::fmt;

/// Resumable read position within a source.
///
/// Positions always describe the boundary *after* the last record handed
/// out, so resuming at a position means the next read returns the first
/// record not yet seen. A reader never reports a position that precedes
/// one it already reported.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum Position {
    /// Nothing consumed yet.
    Start,

    /// Streaming sources: count of records fully consumed.
    Row { offset: u64 },

    /// Paging sources: page index plus the intra-page offset of the next
    /// unread record. `slot` resets to zero on every page boundary.
    Page { page: u64, slot: u64 },

    /// Multi-resource sources: which sub-resource is active and the
    /// delegate's position within it.
    Resource { index: u64, inner: Box<Position> },

    /// Source exhausted; opening here yields immediate exhaustion.
    Done,
}

impl Position {
    pub fn row(offset: u64) -> Self {
        Position::Row { offset }
    }

    pub fn page(page: u64, slot: u64) -> Self {
        Position::Page { page, slot }
    }

    pub fn resource(index: u64, inner: Position) -> Self {
        Position::Resource {
            index,
            inner: Box::new(inner),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Position::Done)
    }

    pub fn is_start(&self) -> bool {
        matches!(self, Position::Start)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Start => write!(f, "start"),
            Position::Row { offset } => write!(f, "row:{offset}"),
            Position::Page { page, slot } => write!(f, "page:{page}/{slot}"),
            Position::Resource { index, inner } => write!(f, "res:{index}/{inner}"),
            Position::Done => write!(f, "done"),
        }
    }
}
