use crate::transform::{Identity, Transform};
use connectors::{reader::RecordReader, writer::RecordWriter};
use engine_core::retry::RetryPolicy;
use std::{collections::HashMap, sync::Arc};
use tracing::warn;

/// Builds a fresh reader per run attempt. A resumed run must reopen its
/// source from scratch, so definitions hold factories, not instances.
pub type ReaderFactory = Box<dyn Fn() -> Box<dyn RecordReader> + Send + Sync>;

/// Builds a fresh writer per run attempt.
pub type WriterFactory = Box<dyn Fn() -> Box<dyn RecordWriter> + Send + Sync>;

/// A named, restartable unit of work: read, transform, write in chunks.
pub struct StepDefinition {
    pub name: String,
    pub chunk_size: usize,
    pub skip_limit: u32,
    pub retry: RetryPolicy,
    reader_factory: ReaderFactory,
    writer_factory: WriterFactory,
    transform: Arc<dyn Transform>,
}

impl StepDefinition {
    pub fn new(
        name: &str,
        chunk_size: usize,
        reader_factory: ReaderFactory,
        writer_factory: WriterFactory,
    ) -> Self {
        StepDefinition {
            name: name.to_string(),
            chunk_size: chunk_size.max(1),
            skip_limit: 0,
            retry: RetryPolicy::default(),
            reader_factory,
            writer_factory,
            transform: Arc::new(Identity),
        }
    }

    pub fn transform(mut self, transform: impl Transform + 'static) -> Self {
        self.transform = Arc::new(transform);
        self
    }

    pub fn skip_limit(mut self, limit: u32) -> Self {
        self.skip_limit = limit;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn make_reader(&self) -> Box<dyn RecordReader> {
        (self.reader_factory)()
    }

    pub fn make_writer(&self) -> Box<dyn RecordWriter> {
        (self.writer_factory)()
    }

    pub fn transform_ref(&self) -> &dyn Transform {
        self.transform.as_ref()
    }
}

/// Explicit name-to-definition map built at startup. Every runnable step
/// is registered by the caller; nothing is discovered dynamically.
#[derive(Default)]
pub struct StepRegistry {
    steps: HashMap<String, Arc<StepDefinition>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        StepRegistry::default()
    }

    pub fn register(&mut self, step: StepDefinition) {
        let name = step.name.clone();
        if self.steps.insert(name.clone(), Arc::new(step)).is_some() {
            warn!(step = %name, "Step registered twice, keeping the latest definition.");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<StepDefinition>> {
        self.steps.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.steps.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
