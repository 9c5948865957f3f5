use crate::memory::{
    fault::{Fault, FaultPlan, FaultState},
    table::MemoryTable,
};
use async_trait::async_trait;
use engine_core::{
    connectors::sink::{ChunkSink, SinkTransaction},
    error::WriteError,
};
use model::core::keyed::Keyed;
use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Default)]
struct SinkStats {
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// Transactional sink that upserts committed chunks into a [`MemoryTable`].
///
/// Staged items stay private to their transaction; a commit applies all of
/// them under a single write lock, so readers never observe half a chunk.
#[derive(Clone)]
pub struct MemorySink<T> {
    table: MemoryTable<T>,
    faults: Arc<Mutex<FaultState>>,
    stats: Arc<SinkStats>,
    committed_chunks: Arc<Mutex<Vec<String>>>,
}

impl<T> MemorySink<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    pub fn new(table: MemoryTable<T>) -> Self {
        Self::with_faults(table, FaultPlan::None)
    }

    pub fn with_faults(table: MemoryTable<T>, plan: FaultPlan) -> Self {
        Self {
            table,
            faults: Arc::new(Mutex::new(FaultState::new(plan))),
            stats: Arc::new(SinkStats::default()),
            committed_chunks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn table(&self) -> &MemoryTable<T> {
        &self.table
    }

    pub fn commits(&self) -> u64 {
        self.stats.commits.load(Ordering::Relaxed)
    }

    pub fn rollbacks(&self) -> u64 {
        self.stats.rollbacks.load(Ordering::Relaxed)
    }

    /// Ids of committed chunks in commit order.
    pub async fn committed_chunks(&self) -> Vec<String> {
        self.committed_chunks.lock().await.clone()
    }
}

#[async_trait]
impl<T> ChunkSink<T> for MemorySink<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    async fn begin(&self, chunk_id: &str) -> Result<Box<dyn SinkTransaction<T>>, WriteError> {
        Ok(Box::new(MemoryTransaction {
            chunk_id: chunk_id.to_string(),
            staged: Vec::new(),
            sink: self.clone(),
        }))
    }
}

struct MemoryTransaction<T> {
    chunk_id: String,
    staged: Vec<T>,
    sink: MemorySink<T>,
}

#[async_trait]
impl<T> SinkTransaction<T> for MemoryTransaction<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    async fn write(&mut self, items: &[T]) -> Result<(), WriteError> {
        let fault = self
            .sink
            .faults
            .lock()
            .await
            .on_stage(items.iter().map(|i| i.key()));
        if fault == Some(Fault::Reject) {
            return Err(WriteError::Rejected {
                chunk_id: self.chunk_id.clone(),
                reason: "injected rejection".into(),
            });
        }
        self.staged.extend_from_slice(items);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), WriteError> {
        let fault = self.sink.faults.lock().await.on_commit();
        match fault {
            Some(Fault::Transient) => {
                return Err(WriteError::Transient(format!(
                    "injected transient failure committing {}",
                    self.chunk_id
                )));
            }
            Some(Fault::Fail) | Some(Fault::Reject) => {
                return Err(WriteError::Commit {
                    chunk_id: self.chunk_id.clone(),
                    reason: "injected commit failure".into(),
                });
            }
            None => {}
        }

        let items = self.staged.len();
        self.sink.table.upsert_all(self.staged).await;
        self.sink.stats.commits.fetch_add(1, Ordering::Relaxed);
        self.sink
            .committed_chunks
            .lock()
            .await
            .push(self.chunk_id.clone());
        debug!(chunk_id = %self.chunk_id, items, "Sink committed chunk");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), WriteError> {
        self.sink.stats.rollbacks.fetch_add(1, Ordering::Relaxed);
        debug!(chunk_id = %self.chunk_id, staged = self.staged.len(), "Sink discarded chunk");
        Ok(())
    }
}
