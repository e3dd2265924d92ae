use crate::{
    error::ReaderError,
    paged::PageFetcher,
    postgres::client::{connect, row_to_record},
};
use async_trait::async_trait;
use model::record::Record;
use tokio_postgres::Client;

/// Serves pages with one bounded query each, ordered by a monotonic sort
/// key so page boundaries stay stable across queries.
pub struct PgPageFetcher {
    url: String,
    table: String,
    columns: Option<Vec<String>>,
    sort_key: String,
    client: Option<Client>,
}

impl PgPageFetcher {
    pub fn new(url: &str, table: &str, sort_key: &str) -> Self {
        PgPageFetcher {
            url: url.to_string(),
            table: table.to_string(),
            columns: None,
            sort_key: sort_key.to_string(),
            client: None,
        }
    }

    pub fn columns(mut self, columns: Vec<String>) -> Self {
        self.columns = Some(columns);
        self
    }
}

fn page_query(table: &str, columns: Option<&[String]>, sort_key: &str) -> String {
    let cols = columns
        .map(|c| c.join(", "))
        .unwrap_or_else(|| "*".to_string());
    format!("SELECT {cols} FROM {table} ORDER BY {sort_key} ASC LIMIT $1 OFFSET $2")
}

#[async_trait]
impl PageFetcher for PgPageFetcher {
    async fn open(&mut self) -> Result<(), ReaderError> {
        self.client = Some(connect(&self.url).await?);
        Ok(())
    }

    async fn fetch_page(&mut self, page: u64, size: u64) -> Result<Vec<Record>, ReaderError> {
        let client = self.client.as_ref().ok_or(ReaderError::NotOpen)?;
        let sql = page_query(&self.table, self.columns.as_deref(), &self.sort_key);
        let limit = size as i64;
        let offset = (page * size) as i64;
        let rows = client.query(&sql, &[&limit, &offset]).await?;
        Ok(rows
            .iter()
            .map(|row| row_to_record(row, &self.table))
            .collect())
    }

    async fn close(&mut self) -> Result<(), ReaderError> {
        self.client = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_orders_and_bounds() {
        assert_eq!(
            page_query("product", None, "id"),
            "SELECT * FROM product ORDER BY id ASC LIMIT $1 OFFSET $2"
        );
        let cols = vec!["id".to_string(), "name".to_string()];
        assert_eq!(
            page_query("product", Some(&cols), "id"),
            "SELECT id, name FROM product ORDER BY id ASC LIMIT $1 OFFSET $2"
        );
    }
}
