use crate::{chunk::id::make_chunk_id, error::ChunkError, state_manager::StateManager};
use engine_core::{
    connectors::{processor::ItemProcessor, reader::ItemReader, writer::ItemWriter},
    metrics::StepMetrics,
    step::StepContext,
};
use model::{core::identifiers::PartitionId, records::chunk::Chunk};
use std::{
    num::NonZeroUsize,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// The reader and the chunk sequence it feeds, guarded together so chunk
/// numbers follow read order.
pub(crate) struct ReaderState<I>
where
    I: Send + 'static,
{
    pub(crate) reader: Box<dyn ItemReader<I>>,
    pub(crate) exhausted: bool,
    pub(crate) next_seq: u64,
}

impl<I> ReaderState<I>
where
    I: Send + 'static,
{
    pub(crate) fn new(reader: Box<dyn ItemReader<I>>) -> Self {
        Self {
            reader,
            exhausted: false,
            next_seq: 0,
        }
    }
}

/// Shared verdict of all workers of one step execution. The first failure
/// wins; later ones are only logged.
#[derive(Default)]
pub(crate) struct Outcome {
    failed: AtomicBool,
    interrupted: AtomicBool,
    error: Mutex<Option<String>>,
}

impl Outcome {
    pub(crate) fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    pub(crate) async fn fail(&self, err: ChunkError) {
        let mut slot = self.error.lock().await;
        if slot.is_none() {
            *slot = Some(err.to_string());
        }
        self.failed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
    }

    pub(crate) fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub(crate) async fn error(&self) -> Option<String> {
        self.error.lock().await.clone()
    }
}

enum Next<I> {
    Chunk { seq: u64, items: Vec<I> },
    Exhausted,
    Stopped,
    Interrupted,
    Failed(ChunkError),
}

/// One chunk loop. Several clones run concurrently for a multi-threaded step.
pub(crate) struct ChunkWorker<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    pub(crate) step: String,
    pub(crate) partition: Option<PartitionId>,
    pub(crate) chunk_size: NonZeroUsize,
    pub(crate) reader: Arc<Mutex<ReaderState<I>>>,
    pub(crate) processor: Arc<dyn ItemProcessor<I, O>>,
    pub(crate) writer: Arc<dyn ItemWriter<O>>,
    pub(crate) ctx: StepContext,
    pub(crate) state: StateManager,
    pub(crate) metrics: StepMetrics,
    pub(crate) outcome: Arc<Outcome>,
}

impl<I, O> Clone for ChunkWorker<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            step: self.step.clone(),
            partition: self.partition,
            chunk_size: self.chunk_size,
            reader: self.reader.clone(),
            processor: self.processor.clone(),
            writer: self.writer.clone(),
            ctx: self.ctx.clone(),
            state: self.state.clone(),
            metrics: self.metrics.clone(),
            outcome: self.outcome.clone(),
        }
    }
}

impl<I, O> ChunkWorker<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    pub(crate) async fn run(self) {
        loop {
            match self.next_chunk().await {
                Next::Chunk { seq, items } => {
                    if let Err(err) = self.process_chunk(seq, items).await {
                        self.outcome.fail(err).await;
                        break;
                    }
                }
                Next::Failed(err) => {
                    self.outcome.fail(err).await;
                    break;
                }
                Next::Interrupted => {
                    self.outcome.interrupt();
                    break;
                }
                Next::Exhausted | Next::Stopped => break,
            }
        }
    }

    /// Assembles the next chunk under the reader lock.
    async fn next_chunk(&self) -> Next<I> {
        let mut state = self.reader.lock().await;
        if state.exhausted {
            return Next::Exhausted;
        }
        if self.outcome.has_failed() {
            return Next::Stopped;
        }
        if self.ctx.is_cancelled() {
            return Next::Interrupted;
        }

        let mut items = Vec::with_capacity(self.chunk_size.get());
        while items.len() < self.chunk_size.get() {
            match state.reader.read().await {
                Ok(Some(item)) => {
                    self.metrics.increment_read(1);
                    items.push(item);
                }
                Ok(None) => {
                    state.exhausted = true;
                    break;
                }
                Err(source) => {
                    state.exhausted = true;
                    return Next::Failed(ChunkError::Read {
                        seq: state.next_seq,
                        source,
                    });
                }
            }
        }

        if items.is_empty() {
            return Next::Exhausted;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        Next::Chunk { seq, items }
    }

    async fn process_chunk(&self, seq: u64, items: Vec<I>) -> Result<(), ChunkError> {
        let started = Instant::now();
        let chunk_id = make_chunk_id(&self.ctx.run_id, &self.step, self.partition, seq);

        self.state
            .begin_chunk(&chunk_id, seq, self.metrics.snapshot().written)
            .await
            .map_err(|source| ChunkError::State {
                chunk_id: chunk_id.clone(),
                source,
            })?;

        let mut output = Vec::with_capacity(items.len());
        let mut filtered = 0u64;
        for item in items {
            match self.processor.process(item) {
                Ok(Some(out)) => output.push(out),
                Ok(None) => filtered += 1,
                Err(source) => {
                    let err = ChunkError::Process {
                        chunk_id: chunk_id.clone(),
                        source,
                    };
                    self.rollback(&chunk_id, seq, &err).await;
                    return Err(err);
                }
            }
        }

        let written = output.len() as u64;
        if !output.is_empty() {
            let chunk = Chunk::new(chunk_id.clone(), seq, output);
            if let Err(source) = self.writer.write(&chunk).await {
                let err = ChunkError::Write {
                    chunk_id: chunk_id.clone(),
                    source,
                };
                self.rollback(&chunk_id, seq, &err).await;
                return Err(err);
            }
        }

        self.metrics.increment_written(written);
        self.metrics.increment_filtered(filtered);
        self.metrics.increment_commits();

        let items_done = self.metrics.snapshot().written;
        if let Err(err) = self
            .state
            .commit_chunk(&chunk_id, seq, written, items_done)
            .await
        {
            warn!(step = %self.step, chunk_id = %chunk_id, error = %err, "Failed to record chunk commit");
        }

        info!(
            run_id = %self.ctx.run_id,
            step = %self.step,
            partition_id = %self.partition_label(),
            chunk_id = %chunk_id,
            seq,
            items = written,
            filtered,
            duration_ms = started.elapsed().as_millis() as u64,
            "Chunk committed"
        );
        Ok(())
    }

    async fn rollback(&self, chunk_id: &str, seq: u64, err: &ChunkError) {
        self.metrics.increment_rollbacks();
        warn!(
            run_id = %self.ctx.run_id,
            step = %self.step,
            partition_id = %self.partition_label(),
            chunk_id = %chunk_id,
            seq,
            error = %err,
            "Chunk rolled back"
        );
        let items_done = self.metrics.snapshot().written;
        if let Err(e) = self
            .state
            .rollback_chunk(chunk_id, seq, &err.to_string(), items_done)
            .await
        {
            warn!(step = %self.step, chunk_id = %chunk_id, error = %e, "Failed to record chunk rollback");
        }
    }

    fn partition_label(&self) -> String {
        self.partition.map(|p| p.label()).unwrap_or_default()
    }
}
