use crate::{
    error::WriterError,
    postgres::client::{PgParams, connect},
    writer::RecordWriter,
};
use async_trait::async_trait;
use model::record::Record;
use tokio_postgres::Client;

/// Keeps each statement well under the wire-protocol parameter limit.
const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Multi-row INSERT of each chunk inside one transaction. Fields absent
/// from a record bind as NULL.
pub struct PgInsertWriter {
    url: String,
    table: String,
    columns: Vec<String>,
    client: Option<Client>,
}

impl PgInsertWriter {
    pub fn new(url: &str, table: &str, columns: Vec<String>) -> Self {
        PgInsertWriter {
            url: url.to_string(),
            table: table.to_string(),
            columns,
            client: None,
        }
    }
}

fn insert_sql(table: &str, columns: &[String], rows: usize) -> String {
    let cols = columns.join(", ");
    let mut groups = Vec::with_capacity(rows);
    let mut idx = 1;
    for _ in 0..rows {
        let group: Vec<String> = columns
            .iter()
            .map(|_| {
                let placeholder = format!("${idx}");
                idx += 1;
                placeholder
            })
            .collect();
        groups.push(format!("({})", group.join(", ")));
    }
    format!("INSERT INTO {table} ({cols}) VALUES {}", groups.join(", "))
}

#[async_trait]
impl RecordWriter for PgInsertWriter {
    async fn open(&mut self) -> Result<(), WriterError> {
        self.client = Some(connect(&self.url).await?);
        Ok(())
    }

    async fn write(&mut self, records: &[Record]) -> Result<u64, WriterError> {
        let client = self.client.as_mut().ok_or(WriterError::NotOpen)?;
        if records.is_empty() {
            return Ok(0);
        }

        let tx = client.transaction().await?;
        let mut total = 0u64;
        for batch in records.chunks(MAX_ROWS_PER_STATEMENT) {
            let sql = insert_sql(&self.table, &self.columns, batch.len());
            let mut params = PgParams::new();
            for record in batch {
                for column in &self.columns {
                    params.push(record.value(column));
                }
            }
            total += tx.execute(&sql, &params.refs()).await?;
        }
        tx.commit().await?;
        Ok(total)
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_groups_placeholders_per_row() {
        let columns = vec!["id".to_string(), "full_name".to_string()];
        assert_eq!(
            insert_sql("customer_processed", &columns, 2),
            "INSERT INTO customer_processed (id, full_name) VALUES ($1, $2), ($3, $4)"
        );
    }
}
