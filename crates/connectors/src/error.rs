use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("Missing resource: {0}")]
    MissingResource(String),
    #[error("Malformed record in {resource} at line {line}: {message}")]
    Malformed {
        resource: String,
        line: u64,
        message: String,
    },
    #[error("Invalid resume position: {0}")]
    InvalidPosition(String),
    #[error("Reader used before open")]
    NotOpen,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),
    #[error("TLS setup error: {0}")]
    Tls(#[from] native_tls::Error),
}

/// Failures establishing a database session, shared by sources and sinks.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),
    #[error("TLS setup error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
}

impl From<ConnectError> for ReaderError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::InvalidUrl(url) => ReaderError::InvalidUrl(url),
            ConnectError::Tls(err) => ReaderError::Tls(err),
            ConnectError::Db(err) => ReaderError::Db(err),
        }
    }
}

impl From<ConnectError> for WriterError {
    fn from(err: ConnectError) -> Self {
        match err {
            ConnectError::InvalidUrl(url) => WriterError::InvalidUrl(url),
            ConnectError::Tls(err) => WriterError::Tls(err),
            ConnectError::Db(err) => WriterError::Db(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Record missing key column '{key}' for {table}")]
    MissingKey { key: String, table: String },
    #[error("Writer used before open")]
    NotOpen,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    #[error("Invalid connection url: {0}")]
    InvalidUrl(String),
    #[error("TLS setup error: {0}")]
    Tls(#[from] native_tls::Error),
    #[error("Write rejected: {0}")]
    Rejected(String),
}
