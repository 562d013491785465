use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The four process-wide ingest counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    Enqueued,
    Processed,
    Failed,
    Retried,
}

/// Cloneable handle over shared counters. Handed explicitly to the producer
/// and the worker; there is no global registry.
#[derive(Clone, Default)]
pub struct Metrics {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    enqueued: AtomicU64,
    processed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(&self, counter: Counter) {
        self.incr_by(counter, 1);
    }

    pub fn incr_by(&self, counter: Counter, n: u64) {
        let cell = match counter {
            Counter::Enqueued => &self.inner.enqueued,
            Counter::Processed => &self.inner.processed,
            Counter::Failed => &self.inner.failed,
            Counter::Retried => &self.inner.retried,
        };
        cell.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            enqueued: self.inner.enqueued.load(Ordering::Relaxed),
            processed: self.inner.processed.load(Ordering::Relaxed),
            failed: self.inner.failed.load(Ordering::Relaxed),
            retried: self.inner.retried.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub enqueued: u64,
    pub processed: u64,
    pub failed: u64,
    pub retried: u64,
}
