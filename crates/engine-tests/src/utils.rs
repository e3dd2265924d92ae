#![allow(dead_code)]

use async_trait::async_trait;
use connectors::{
    error::WriterError,
    file::{
        csv::{CsvReader, CsvReaderConfig},
        json::{JsonReader, JsonReaderConfig},
        jsonl::JsonLinesWriter,
    },
    memory::VecWriter,
    multi::MultiReader,
    reader::RecordReader,
    writer::RecordWriter,
};
use engine_runtime::registry::{ReaderFactory, StepDefinition, StepRegistry, WriterFactory};
use model::record::Record;
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shared chunk buffer a test can observe across writer instances.
pub type Sink = Arc<Mutex<Vec<Vec<Record>>>>;

/// Five customers; the usual source for chunking and transform scenarios.
pub const CUSTOMERS_CSV: &str = "\
first_name,last_name
Ada,Lovelace
Grace,Hopper
Alan,Turing
Edsger,Dijkstra
Barbara,Liskov
";

/// Four orders, the third with a price no numeric transform can read.
pub const ORDERS_CSV: &str = "\
order_id,price
1,100
2,250.5
3,n/a
4,80
";

/// Three orders as a top-level JSON array.
pub const ORDERS_JSON: &str = r#"[
  { "order_id": 1, "price": 100.0 },
  { "order_id": 2, "price": 250.5 },
  { "order_id": 3, "price": 80.0 }
]"#;

pub fn new_sink() -> Sink {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture file");
    path
}

pub fn single_step_registry(step: StepDefinition) -> Arc<StepRegistry> {
    let mut registry = StepRegistry::new();
    registry.register(step);
    Arc::new(registry)
}

pub fn csv_reader_factory(config: CsvReaderConfig) -> ReaderFactory {
    Box::new(move || Box::new(CsvReader::new(config.clone())))
}

pub fn csv_multi_reader_factory(paths: Vec<PathBuf>, entity: &str) -> ReaderFactory {
    let configs: Vec<CsvReaderConfig> = paths
        .iter()
        .map(|path| CsvReaderConfig::new(path, entity))
        .collect();
    Box::new(move || {
        let readers: Vec<Box<dyn RecordReader>> = configs
            .iter()
            .map(|config| Box::new(CsvReader::new(config.clone())) as Box<dyn RecordReader>)
            .collect();
        Box::new(MultiReader::new(readers))
    })
}

pub fn json_reader_factory(config: JsonReaderConfig) -> ReaderFactory {
    Box::new(move || Box::new(JsonReader::new(config.clone())))
}

pub fn vec_writer_factory(sink: &Sink) -> WriterFactory {
    let sink = Arc::clone(sink);
    Box::new(move || Box::new(VecWriter::with_sink(Arc::clone(&sink))))
}

pub fn jsonl_writer_factory(path: &Path) -> WriterFactory {
    let path = path.to_path_buf();
    Box::new(move || Box::new(JsonLinesWriter::new(&path, false)))
}

/// Writer factory whose first instance rejects the nth chunk write. Every
/// later instance behaves normally, so a resumed attempt goes through.
pub fn failing_once_writer_factory(sink: &Sink, fail_on_chunk: u64) -> WriterFactory {
    let sink = Arc::clone(sink);
    let armed = Arc::new(AtomicBool::new(true));
    Box::new(move || {
        let writer = VecWriter::with_sink(Arc::clone(&sink));
        if armed.swap(false, Ordering::SeqCst) {
            Box::new(writer.fail_on_chunk(fail_on_chunk))
        } else {
            Box::new(writer)
        }
    })
}

/// Writer factory whose first instance cancels `cancel` once it has
/// committed `after_chunks` chunks. Later instances write normally.
pub fn cancel_once_writer_factory(
    sink: &Sink,
    cancel: CancellationToken,
    after_chunks: u64,
) -> WriterFactory {
    let sink = Arc::clone(sink);
    let armed = Arc::new(AtomicBool::new(true));
    Box::new(move || {
        let writer = VecWriter::with_sink(Arc::clone(&sink));
        if armed.swap(false, Ordering::SeqCst) {
            Box::new(CancelAfterWriter::new(writer, cancel.clone(), after_chunks))
        } else {
            Box::new(writer)
        }
    })
}

/// Writer factory returning instances that fail their first `failures`
/// writes with a transient IO error, then succeed. Pairs with a retry
/// policy to exercise bounded retries.
pub fn flaky_writer_factory(sink: &Sink, failures: u32) -> WriterFactory {
    let sink = Arc::clone(sink);
    Box::new(move || {
        Box::new(FlakyWriter {
            inner: VecWriter::with_sink(Arc::clone(&sink)),
            failures_left: failures,
        })
    })
}

pub async fn chunk_sizes(sink: &Sink) -> Vec<usize> {
    sink.lock().await.iter().map(|chunk| chunk.len()).collect()
}

pub async fn total_records(sink: &Sink) -> usize {
    sink.lock().await.iter().map(|chunk| chunk.len()).sum()
}

/// Flattens the sink and projects one field per record, as strings.
pub async fn field_strings(sink: &Sink, field: &str) -> Vec<String> {
    sink.lock()
        .await
        .iter()
        .flatten()
        .map(|record| record.value(field).as_string().unwrap_or_default())
        .collect()
}

pub async fn field_floats(sink: &Sink, field: &str) -> Vec<f64> {
    sink.lock()
        .await
        .iter()
        .flatten()
        .map(|record| record.value(field).as_f64().expect("numeric field"))
        .collect()
}

/// Test double injecting transient failures ahead of an in-memory sink.
struct FlakyWriter {
    inner: VecWriter,
    failures_left: u32,
}

#[async_trait]
impl RecordWriter for FlakyWriter {
    async fn open(&mut self) -> Result<(), WriterError> {
        self.inner.open().await
    }

    async fn write(&mut self, records: &[Record]) -> Result<u64, WriterError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(WriterError::Io(std::io::Error::other(
                "simulated transient failure",
            )));
        }
        self.inner.write(records).await
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        self.inner.close().await
    }
}

/// Test double that cancels a token after committing a number of chunks,
/// so cancellation lands exactly on a chunk boundary.
struct CancelAfterWriter {
    inner: VecWriter,
    cancel: CancellationToken,
    after_chunks: u64,
    written: u64,
}

impl CancelAfterWriter {
    fn new(inner: VecWriter, cancel: CancellationToken, after_chunks: u64) -> Self {
        CancelAfterWriter {
            inner,
            cancel,
            after_chunks,
            written: 0,
        }
    }
}

#[async_trait]
impl RecordWriter for CancelAfterWriter {
    async fn open(&mut self) -> Result<(), WriterError> {
        self.inner.open().await
    }

    async fn write(&mut self, records: &[Record]) -> Result<u64, WriterError> {
        let count = self.inner.write(records).await?;
        self.written += 1;
        if self.written >= self.after_chunks {
            info!(
                chunks = self.written,
                "Requesting cancellation after chunk commit."
            );
            self.cancel.cancel();
        }
        Ok(count)
    }

    async fn close(&mut self) -> Result<(), WriterError> {
        self.inner.close().await
    }
}
