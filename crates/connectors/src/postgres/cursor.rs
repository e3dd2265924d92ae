use crate::{
    error::ReaderError,
    postgres::client::{connect, row_to_record},
    reader::RecordReader,
};
use async_trait::async_trait;
use model::{position::Position, record::Record};
use std::collections::VecDeque;
use tokio_postgres::Client;
use tracing::warn;

const CURSOR_NAME: &str = "hopper_cursor";

/// Streaming reader over one long-lived query using a server-side portal.
///
/// The query must carry a deterministic `ORDER BY` on a monotonic sort
/// key; the reported position is the count of rows consumed, and a
/// resume re-declares the portal and moves past the committed rows.
#[derive(Debug, Clone)]
pub struct PgCursorConfig {
    pub url: String,
    pub query: String,
    pub entity: String,
    /// Rows pulled per FETCH round-trip.
    pub fetch_size: u32,
    /// Run the enclosing transaction in read-only mode.
    pub read_only: bool,
}

impl PgCursorConfig {
    pub fn new(url: &str, query: &str, entity: &str) -> Self {
        PgCursorConfig {
            url: url.to_string(),
            query: query.to_string(),
            entity: entity.to_string(),
            fetch_size: 100,
            read_only: false,
        }
    }

    pub fn fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

pub struct PgCursorReader {
    config: PgCursorConfig,
    client: Option<Client>,
    buffer: VecDeque<Record>,
    offset: u64,
    short_fetch_seen: bool,
    cursor_open: bool,
    done: bool,
    opened: bool,
}

impl PgCursorReader {
    pub fn new(config: PgCursorConfig) -> Self {
        PgCursorReader {
            config,
            client: None,
            buffer: VecDeque::new(),
            offset: 0,
            short_fetch_seen: false,
            cursor_open: false,
            done: false,
            opened: false,
        }
    }

    fn effective_fetch_size(&self) -> u64 {
        self.config.fetch_size.max(1) as u64
    }

    /// Best-effort end of the portal and its transaction. Errors only
    /// get logged: by the time this runs the rows are already consumed.
    async fn finish_cursor(&mut self) {
        if let Some(client) = self.client.take()
            && self.cursor_open
            && let Err(err) = client
                .batch_execute(&format!("CLOSE {CURSOR_NAME}; COMMIT;"))
                .await
        {
            warn!(%err, "Failed to close server cursor cleanly.");
        }
        self.cursor_open = false;
    }
}

fn begin_sql(read_only: bool) -> &'static str {
    if read_only { "BEGIN READ ONLY" } else { "BEGIN" }
}

fn declare_sql(query: &str) -> String {
    format!("DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR {query}")
}

#[async_trait]
impl RecordReader for PgCursorReader {
    async fn open(&mut self, resume: Option<Position>) -> Result<(), ReaderError> {
        self.opened = true;
        self.buffer.clear();
        self.offset = 0;
        self.short_fetch_seen = false;
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
                    "cursor source cannot resume at {other}"
                )));
            }
        };

        let client = connect(&self.config.url).await?;
        client.batch_execute(begin_sql(self.config.read_only)).await?;
        client.batch_execute(&declare_sql(&self.config.query)).await?;
        self.cursor_open = true;

        if target > 0 {
            let moved = client
                .execute(&format!("MOVE FORWARD {target} IN {CURSOR_NAME}"), &[])
                .await?;
            if moved < target {
                self.client = Some(client);
                self.finish_cursor().await;
                return Err(ReaderError::InvalidPosition(format!(
                    "resume offset {target} is beyond the {moved} rows the query yields"
                )));
            }
        }

        self.offset = target;
        self.client = Some(client);
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Record>, ReaderError> {
        if !self.opened {
            return Err(ReaderError::NotOpen);
        }
        if self.done {
            return Ok(None);
        }

        if self.buffer.is_empty() {
            if self.short_fetch_seen {
                self.done = true;
                self.finish_cursor().await;
                return Ok(None);
            }
            let fetch_size = self.effective_fetch_size();
            let client = self.client.as_ref().ok_or(ReaderError::NotOpen)?;
            let rows = client
                .query(
                    &format!("FETCH FORWARD {fetch_size} FROM {CURSOR_NAME}"),
                    &[],
                )
                .await?;
            if (rows.len() as u64) < fetch_size {
                self.short_fetch_seen = true;
            }
            self.buffer = rows
                .iter()
                .map(|row| row_to_record(row, &self.config.entity))
                .collect();
        }

        match self.buffer.pop_front() {
            Some(record) => {
                self.offset += 1;
                Ok(Some(record))
            }
            None => {
                self.done = true;
                self.finish_cursor().await;
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
        self.buffer.clear();
        self.finish_cursor().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_embed_cursor_name_and_mode() {
        assert_eq!(begin_sql(true), "BEGIN READ ONLY");
        assert_eq!(begin_sql(false), "BEGIN");
        assert_eq!(
            declare_sql("SELECT id FROM t ORDER BY id"),
            "DECLARE hopper_cursor NO SCROLL CURSOR FOR SELECT id FROM t ORDER BY id"
        );
    }
}
