use model::execution::step::StepCounts;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct InnerMetrics {
    read: AtomicU64,
    written: AtomicU64,
    filtered: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// Shared counters of one step execution.
///
/// Chunk workers of the same step update these concurrently; every update is
/// a single atomic add, so a snapshot never observes a torn increment.
#[derive(Debug, Clone)]
pub struct StepMetrics {
    inner: Arc<InnerMetrics>,
}

impl StepMetrics {
    pub fn new() -> Self {
        StepMetrics {
            inner: Arc::new(InnerMetrics::default()),
        }
    }

    pub fn increment_read(&self, count: u64) {
        self.inner.read.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_written(&self, count: u64) {
        self.inner.written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_filtered(&self, count: u64) {
        self.inner.filtered.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_commits(&self) {
        self.inner.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rollbacks(&self) {
        self.inner.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StepCounts {
        StepCounts {
            read: self.inner.read.load(Ordering::Relaxed),
            written: self.inner.written.load(Ordering::Relaxed),
            filtered: self.inner.filtered.load(Ordering::Relaxed),
            commits: self.inner.commits.load(Ordering::Relaxed),
            rollbacks: self.inner.rollbacks.load(Ordering::Relaxed),
        }
    }
}

impl Default for StepMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let metrics = StepMetrics::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let m = metrics.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..1000 {
                    m.increment_read(1);
                    m.increment_written(1);
                }
                m.increment_commits();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let snap = metrics.snapshot();
        assert_eq!(snap.read, 8000);
        assert_eq!(snap.written, 8000);
        assert_eq!(snap.commits, 8);
        assert!(snap.is_reconciled());
    }
}
