use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct Metrics {
    // Counters
    received: AtomicUsize,
    succeeded: AtomicUsize,
    failed_decode: AtomicUsize,
    failed_generation: AtomicUsize,
    failed_store: AtomicUsize,

    // Timing (in microseconds)
    total_generate_time_us: AtomicU64,
    total_commit_time_us: AtomicU64,

    // Counts
    generated: AtomicUsize,
    commits_attempted: AtomicUsize,
    statements_emitted: AtomicUsize,
}

/// Where a failed trigger gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Decode,
    Generation,
    Store,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            received: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed_decode: AtomicUsize::new(0),
            failed_generation: AtomicUsize::new(0),
            failed_store: AtomicUsize::new(0),
            total_generate_time_us: AtomicU64::new(0),
            total_commit_time_us: AtomicU64::new(0),
            generated: AtomicUsize::new(0),
            commits_attempted: AtomicUsize::new(0),
            statements_emitted: AtomicUsize::new(0),
        })
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, stage: FailureStage) {
        let counter = match stage {
            FailureStage::Decode => &self.failed_decode,
            FailureStage::Generation => &self.failed_generation,
            FailureStage::Store => &self.failed_store,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_generate(&self, duration: Duration, statements: usize) {
        self.total_generate_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.generated.fetch_add(1, Ordering::Relaxed);
        self.statements_emitted.fetch_add(statements, Ordering::Relaxed);
    }

    pub fn record_commit(&self, duration: Duration) {
        self.total_commit_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.commits_attempted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let failed_decode = self.failed_decode.load(Ordering::Relaxed);
        let failed_generation = self.failed_generation.load(Ordering::Relaxed);
        let failed_store = self.failed_store.load(Ordering::Relaxed);

        MetricsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            failed: failed_decode + failed_generation + failed_store,
            failed_decode,
            failed_generation,
            failed_store,
            statements_emitted: self.statements_emitted.load(Ordering::Relaxed),
            avg_generate_time_ms: self.avg_time_ms(&self.total_generate_time_us, &self.generated),
            avg_commit_time_ms: self.avg_time_ms(&self.total_commit_time_us, &self.commits_attempted),
        }
    }

    fn avg_time_ms(&self, total_us: &AtomicU64, count: &AtomicUsize) -> f64 {
        let total = total_us.load(Ordering::Relaxed) as f64;
        let cnt = count.load(Ordering::Relaxed) as f64;
        if cnt > 0.0 {
            total / cnt / 1000.0 // Convert to ms
        } else {
            0.0
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub received: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failed_decode: usize,
    pub failed_generation: usize,
    pub failed_store: usize,
    pub statements_emitted: usize,
    pub avg_generate_time_ms: f64,
    pub avg_commit_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
