use std::{
    future::Future,
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::{
    sync::Semaphore,
    task::{JoinError, JoinHandle},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{Instrument, info, info_span, warn};

/// Bounded set of concurrent execution slots.
///
/// Any number of tasks may be submitted; at most `size` of them run at once,
/// the rest wait for a slot in submission order. Each task runs inside a
/// `worker` span named `{name}-{n}`.
pub struct WorkerPool {
    name: String,
    size: NonZeroUsize,
    slots: Arc<Semaphore>,
    tracker: TaskTracker,
    next_worker: AtomicUsize,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, size: NonZeroUsize) -> Self {
        Self {
            name: name.into(),
            size,
            slots: Arc::new(Semaphore::new(size.get())),
            tracker: TaskTracker::new(),
            next_worker: AtomicUsize::new(1),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size.get()
    }

    pub fn spawn<F, T>(&self, task: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let slots = self.slots.clone();
        let worker = format!(
            "{}-{}",
            self.name,
            self.next_worker.fetch_add(1, Ordering::Relaxed)
        );
        let span = info_span!("worker", name = %worker);

        self.tracker.spawn(
            async move {
                // Never closed.
                let _slot = slots.acquire_owned().await.ok();
                task.await
            }
            .instrument(span),
        )
    }

    /// Waits for every handle. Once `cancel` fires, waits at most `grace`
    /// longer; tasks still running then are abandoned and reported as `None`.
    pub async fn drain<T>(
        &self,
        handles: Vec<JoinHandle<T>>,
        cancel: &CancellationToken,
        grace: Duration,
    ) -> Vec<Option<Result<T, JoinError>>> {
        self.tracker.close();
        let completed = tokio::select! {
            _ = self.tracker.wait() => true,
            _ = cancel.cancelled() => self.shutdown(grace).await,
        };

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            if completed || handle.is_finished() {
                results.push(Some(handle.await));
            } else {
                results.push(None);
            }
        }
        results
    }

    /// Stops accepting work and waits for in-flight tasks, at most `timeout`.
    /// Returns `false` if the wait timed out; remaining tasks keep running
    /// detached.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!(pool = %self.name, "Worker pool drained");
                true
            }
            Err(_) => {
                warn!(
                    pool = %self.name,
                    pending = self.tracker.len(),
                    timeout_ms = timeout.as_millis() as u64,
                    "Worker pool shutdown timed out"
                );
                false
            }
        }
    }
}
