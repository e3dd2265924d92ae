use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    records_read: AtomicU64,
    records_written: AtomicU64,
    chunks_committed: AtomicU64,
    records_skipped: AtomicU64,
    retry_count: AtomicU64,
}

/// Cheap shared counters for one run; clones observe the same totals.
#[derive(Debug, Clone)]
pub struct Metrics {
    inner: Arc<InnerMetrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub records_read: u64,
    pub records_written: u64,
    pub chunks_committed: u64,
    pub records_skipped: u64,
    pub retry_count: u64,
}

impl Metrics {
    pub fn new() -> Self {
        Metrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn add_read(&self, count: u64) {
        self.inner.records_read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_written(&self, count: u64) {
        self.inner
            .records_written
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_chunk(&self) {
        self.inner.chunks_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_skipped(&self, count: u64) {
        self.inner
            .records_skipped
            .fetch_add(count, Ordering::Relaxed);
    }

    pub fn add_retry(&self) {
        self.inner.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_read: self.inner.records_read.load(Ordering::Relaxed),
            records_written: self.inner.records_written.load(Ordering::Relaxed),
            chunks_committed: self.inner.chunks_committed.load(Ordering::Relaxed),
            records_skipped: self.inner.records_skipped.load(Ordering::Relaxed),
            retry_count: self.inner.retry_count.load(Ordering::Relaxed),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
