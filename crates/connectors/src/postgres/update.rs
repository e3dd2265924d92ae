use crate::{
    error::WriterError,
    postgres::client::{PgParams, connect},
    writer::RecordWriter,
};
use async_trait::async_trait;
use model::record::Record;
use tokio_postgres::Client;

/// Keyed update, one statement per record, all inside one transaction.
/// A record whose key column is absent or NULL fails the chunk before
/// anything commits.
pub struct PgUpdateWriter {
    url: String,
    table: String,
    set_columns: Vec<String>,
    key_column: String,
    client: Option<Client>,
}

impl PgUpdateWriter {
    pub fn new(url: &str, table: &str, set_columns: Vec<String>, key_column: &str) -> Self {
        PgUpdateWriter {
            url: url.to_string(),
            table: table.to_string(),
            set_columns,
            key_column: key_column.to_string(),
            client: None,
        }
    }
}

fn update_sql(table: &str, set_columns: &[String], key_column: &str) -> String {
    let sets: Vec<String> = set_columns
        .iter()
        .enumerate()
        .map(|(idx, column)| format!("{column} = ${}", idx + 1))
        .collect();
    format!(
        "UPDATE {table} SET {} WHERE {key_column} = ${}",
        sets.join(", "),
        set_columns.len() + 1
    )
}

#[async_trait]
impl RecordWriter for PgUpdateWriter {
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
        let statement = tx
            .prepare(&update_sql(&self.table, &self.set_columns, &self.key_column))
            .await?;

        let mut total = 0u64;
        for record in records {
            let key = match record.get(&self.key_column) {
                Some(value) if !value.is_null() => value.clone(),
                _ => {
                    return Err(WriterError::MissingKey {
                        key: self.key_column.clone(),
                        table: self.table.clone(),
                    });
                }
            };
            let mut params = PgParams::new();
            for column in &self.set_columns {
                params.push(record.value(column));
            }
            params.push(key);
            total += tx.execute(&statement, &params.refs()).await?;
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
    fn statement_binds_sets_then_key() {
        let sets = vec!["price".to_string()];
        assert_eq!(
            update_sql("product", &sets, "name"),
            "UPDATE product SET price = $1 WHERE name = $2"
        );

        let sets = vec!["price".to_string(), "stock".to_string()];
        assert_eq!(
            update_sql("product", &sets, "id"),
            "UPDATE product SET price = $1, stock = $2 WHERE id = $3"
        );
    }
}
