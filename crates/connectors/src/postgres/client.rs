use crate::error::ConnectError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use model::{record::Record, value::Value};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use tokio_postgres::{
    Client, Config, NoTls, Row,
    config::SslMode,
    types::{Json as PgJson, ToSql, Type},
};
use tracing::{error, warn};

/// Connects and spawns the connection driver task. The TLS path follows
/// the url's `sslmode`; `prefer` falls back to plaintext when the
/// handshake fails.
pub async fn connect(url: &str) -> Result<Client, ConnectError> {
    let config = url
        .parse::<Config>()
        .map_err(|err| ConnectError::InvalidUrl(err.to_string()))?;

    match config.get_ssl_mode() {
        SslMode::Disable => connect_no_tls(config).await,
        SslMode::Prefer => match connect_tls(config.clone()).await {
            Ok(client) => Ok(client),
            Err(error) => {
                warn!(%error, "Postgres TLS handshake failed, retrying without TLS.");
                connect_no_tls(config).await
            }
        },
        _ => connect_tls(config).await,
    }
}

async fn connect_tls(config: Config) -> Result<Client, ConnectError> {
    let connector = TlsConnector::builder().build()?;
    let tls = MakeTlsConnector::new(connector);
    let (client, connection) = config.connect(tls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

async fn connect_no_tls(config: Config) -> Result<Client, ConnectError> {
    let (client, connection) = config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(%err, "Postgres connection error");
        }
    });
    Ok(client)
}

/// Owned parameter buffer bridging `Value` into `ToSql` bindings.
pub(crate) struct PgParams(Vec<Box<dyn ToSql + Sync + Send>>);

impl PgParams {
    pub fn new() -> Self {
        PgParams(Vec::new())
    }

    pub fn push(&mut self, value: Value) {
        let boxed: Box<dyn ToSql + Sync + Send> = match value {
            Value::Null => Box::new(Option::<String>::None),
            Value::Bool(v) => Box::new(v),
            Value::Int(v) => Box::new(v),
            Value::Float(v) => Box::new(v),
            Value::Text(v) => Box::new(v),
            Value::Date(v) => Box::new(v),
            Value::Timestamp(v) => Box::new(v),
            Value::Uuid(v) => Box::new(v),
            Value::Json(v) => Box::new(PgJson(v)),
        };
        self.0.push(boxed);
    }

    pub fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.0.iter().map(|param| param.as_ref() as _).collect()
    }
}

pub fn row_to_record(row: &Row, entity: &str) -> Record {
    let mut record = Record::new(entity);
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_column(row, idx, column.type_());
        record.set(column.name(), value);
    }
    record
}

fn decode_column(row: &Row, idx: usize, ty: &Type) -> Value {
    let decoded: Result<Value, tokio_postgres::Error> = if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)
            .map(|v| v.map_or(Value::Null, |v| Value::Int(v as i64)))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)
            .map(|v| v.map_or(Value::Null, |v| Value::Int(v as i64)))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Int))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)
            .map(|v| v.map_or(Value::Null, |v| Value::Float(v as f64)))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Float))
    } else if *ty == Type::NUMERIC {
        row.try_get::<_, Option<Decimal>>(idx).map(|v| {
            v.and_then(|v| v.to_f64())
                .map_or(Value::Null, Value::Float)
        })
    } else if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Bool))
    } else if *ty == Type::TIMESTAMPTZ {
        row.try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Timestamp))
    } else if *ty == Type::TIMESTAMP {
        row.try_get::<_, Option<NaiveDateTime>>(idx).map(|v| {
            v.map_or(Value::Null, |v| {
                Value::Timestamp(Utc.from_utc_datetime(&v))
            })
        })
    } else if *ty == Type::DATE {
        row.try_get::<_, Option<NaiveDate>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Date))
    } else if *ty == Type::UUID {
        row.try_get::<_, Option<uuid::Uuid>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Uuid))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Json))
    } else {
        row.try_get::<_, Option<String>>(idx)
            .map(|v| v.map_or(Value::Null, Value::Text))
    };

    match decoded {
        Ok(value) => value,
        Err(err) => {
            warn!(column = idx, %err, "Failed to decode column, substituting NULL.");
            Value::Null
        }
    }
}
