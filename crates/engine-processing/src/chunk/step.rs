use crate::{
    chunk::worker::{ChunkWorker, Outcome, ReaderState},
    error::ChunkError,
    state_manager::StateManager,
    transform::pipeline::PassThrough,
};
use async_trait::async_trait;
use engine_config::settings::{error::SettingsError, validated::ValidatedSettings};
use engine_core::{
    connectors::{processor::ItemProcessor, reader::ItemReader, writer::ItemWriter},
    metrics::StepMetrics,
    pool::WorkerPool,
    step::{Step, StepContext},
};
use model::execution::{partition::PartitionContext, step::StepExecution};
use std::{num::NonZeroUsize, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Builds a fresh reader for every execution of a step.
pub type ReaderFactory<I> = Arc<dyn Fn() -> Box<dyn ItemReader<I>> + Send + Sync>;

/// Where an execution gets its reader from.
enum ReaderSource<I>
where
    I: Send + 'static,
{
    /// Handed over to the first execution; later ones fail.
    Once(Mutex<Option<Box<dyn ItemReader<I>>>>),
    Factory(ReaderFactory<I>),
}

impl<I> ReaderSource<I>
where
    I: Send + 'static,
{
    async fn open(&self) -> Option<Box<dyn ItemReader<I>>> {
        match self {
            ReaderSource::Once(slot) => slot.lock().await.take(),
            ReaderSource::Factory(factory) => Some(factory()),
        }
    }
}

/// Chunk-oriented step: read up to `chunk_size` items, process each one, hand
/// the survivors to the writer as one chunk, commit, repeat until the reader
/// is exhausted.
///
/// With `concurrency > 1` several chunk loops share the reader; each chunk is
/// still read, processed and written as a unit. The first failed chunk fails
/// the step: chunks already in flight finish, no new chunk starts.
///
/// A step built with [`ChunkStepBuilder::reader`] runs once; executing it
/// again fails with [`ChunkError::ReaderConsumed`]. Steps that are re-run,
/// e.g. as part of a job launched repeatedly, take a
/// [`ChunkStepBuilder::reader_factory`] instead.
pub struct ChunkStep<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    name: String,
    reader: ReaderSource<I>,
    processor: Arc<dyn ItemProcessor<I, O>>,
    writer: Arc<dyn ItemWriter<O>>,
    chunk_size: NonZeroUsize,
    concurrency: NonZeroUsize,
    partition: Option<PartitionContext>,
    shutdown_timeout: Duration,
}

impl<I, O> ChunkStep<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    pub fn builder(name: impl Into<String>) -> ChunkStepBuilder<I, O> {
        ChunkStepBuilder::new(name)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size.get()
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency.get()
    }

    pub fn partition(&self) -> Option<&PartitionContext> {
        self.partition.as_ref()
    }

    fn new_execution(&self) -> StepExecution {
        match self.partition {
            Some(partition) => StepExecution::for_partition(&self.name, partition),
            None => StepExecution::new(&self.name),
        }
    }

    async fn run_workers(&self, worker: ChunkWorker<I, O>, ctx: &StepContext) {
        if self.concurrency.get() == 1 {
            worker.run().await;
            return;
        }

        let pool = WorkerPool::new(format!("{}-chunk", self.name), self.concurrency);
        let handles = (0..self.concurrency.get())
            .map(|_| pool.spawn(worker.clone().run()))
            .collect();

        for result in pool.drain(handles, &ctx.cancel, self.shutdown_timeout).await {
            match result {
                Some(Ok(())) => {}
                Some(Err(join_err)) => {
                    worker
                        .outcome
                        .fail(ChunkError::Panicked(join_err.to_string()))
                        .await;
                }
                None => worker.outcome.interrupt(),
            }
        }
    }
}

#[async_trait]
impl<I, O> Step for ChunkStep<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StepContext) -> StepExecution {
        let mut execution = self.new_execution();
        execution.start();

        let partition = self.partition.map(|p| p.id());
        info!(
            run_id = %ctx.run_id,
            step = %self.name,
            partition_id = %partition.map(|p| p.label()).unwrap_or_default(),
            chunk_size = self.chunk_size.get(),
            concurrency = self.concurrency.get(),
            "Chunk step started"
        );

        let Some(reader) = self.reader.open().await else {
            let err = ChunkError::ReaderConsumed(self.name.clone());
            error!(run_id = %ctx.run_id, step = %self.name, error = %err, "Chunk step failed");
            execution.fail(err.to_string());
            return execution;
        };

        let metrics = StepMetrics::new();
        let outcome = Arc::new(Outcome::default());
        let worker = ChunkWorker {
            step: self.name.clone(),
            partition,
            chunk_size: self.chunk_size,
            reader: Arc::new(Mutex::new(ReaderState::new(reader))),
            processor: self.processor.clone(),
            writer: self.writer.clone(),
            ctx: ctx.clone(),
            state: StateManager::new(ctx, &self.name, partition),
            metrics: metrics.clone(),
            outcome: outcome.clone(),
        };

        self.run_workers(worker, ctx).await;

        execution.counts = metrics.snapshot();
        let counts = execution.counts;

        if let Some(err) = outcome.error().await {
            error!(
                run_id = %ctx.run_id,
                step = %self.name,
                error = %err,
                read = counts.read,
                written = counts.written,
                rollbacks = counts.rollbacks,
                "Chunk step failed"
            );
            execution.fail(err);
        } else if outcome.was_interrupted() {
            warn!(
                run_id = %ctx.run_id,
                step = %self.name,
                read = counts.read,
                written = counts.written,
                "Chunk step interrupted"
            );
            execution.fail(format!(
                "interrupted after {} committed chunks",
                counts.commits
            ));
        } else {
            execution.complete();
            info!(
                run_id = %ctx.run_id,
                step = %self.name,
                read = counts.read,
                written = counts.written,
                filtered = counts.filtered,
                commits = counts.commits,
                duration_ms = execution.duration_ms().unwrap_or_default(),
                "Chunk step completed"
            );
        }

        execution
    }
}

/// Assembles a [`ChunkStep`]. Reader, processor and writer are required.
pub struct ChunkStepBuilder<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    name: String,
    reader: Option<ReaderSource<I>>,
    processor: Option<Arc<dyn ItemProcessor<I, O>>>,
    writer: Option<Arc<dyn ItemWriter<O>>>,
    chunk_size: Option<usize>,
    concurrency: Option<usize>,
    partition: Option<PartitionContext>,
    shutdown_timeout: Option<Duration>,
}

impl<I, O> ChunkStepBuilder<I, O>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reader: None,
            processor: None,
            writer: None,
            chunk_size: None,
            concurrency: None,
            partition: None,
            shutdown_timeout: None,
        }
    }

    /// Reader for a single execution of the step.
    pub fn reader(mut self, reader: impl ItemReader<I> + 'static) -> Self {
        let reader: Box<dyn ItemReader<I>> = Box::new(reader);
        self.reader = Some(ReaderSource::Once(Mutex::new(Some(reader))));
        self
    }

    /// Opens a new reader at the start of every execution.
    pub fn reader_factory<R, F>(mut self, factory: F) -> Self
    where
        R: ItemReader<I> + 'static,
        F: Fn() -> R + Send + Sync + 'static,
    {
        let factory: ReaderFactory<I> =
            Arc::new(move || -> Box<dyn ItemReader<I>> { Box::new(factory()) });
        self.reader = Some(ReaderSource::Factory(factory));
        self
    }

    pub fn processor(mut self, processor: impl ItemProcessor<I, O> + 'static) -> Self {
        self.processor = Some(Arc::new(processor));
        self
    }

    pub fn writer(mut self, writer: impl ItemWriter<O> + 'static) -> Self {
        self.writer = Some(Arc::new(writer));
        self
    }

    /// Writer shared with other steps, e.g. every partition of a fan-out.
    pub fn shared_writer(mut self, writer: Arc<dyn ItemWriter<O>>) -> Self {
        self.writer = Some(writer);
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    pub fn partition(mut self, partition: PartitionContext) -> Self {
        self.partition = Some(partition);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Takes chunk size, chunk workers and shutdown timeout from `settings`
    /// unless they were set explicitly.
    pub fn with_settings(mut self, settings: &ValidatedSettings) -> Self {
        self.chunk_size.get_or_insert(settings.chunk_size());
        self.concurrency.get_or_insert(settings.chunk_workers());
        self.shutdown_timeout
            .get_or_insert(settings.shutdown_timeout());
        self
    }

    pub fn build(self) -> Result<ChunkStep<I, O>, SettingsError> {
        let chunk_size = self.chunk_size.unwrap_or(1);
        let chunk_size = NonZeroUsize::new(chunk_size)
            .ok_or(SettingsError::InvalidChunkSize(chunk_size as i64))?;

        let concurrency = self.concurrency.unwrap_or(1);
        let concurrency =
            NonZeroUsize::new(concurrency).ok_or_else(|| SettingsError::InvalidPoolSize {
                pool: "chunk_workers".to_string(),
                value: concurrency as i64,
            })?;

        let missing = |component: &str| SettingsError::MissingComponent {
            step: self.name.clone(),
            component: component.to_string(),
        };
        let reader = self.reader.ok_or_else(|| missing("reader"))?;
        let processor = self.processor.ok_or_else(|| missing("processor"))?;
        let writer = self.writer.ok_or_else(|| missing("writer"))?;

        Ok(ChunkStep {
            name: self.name,
            reader,
            processor,
            writer,
            chunk_size,
            concurrency,
            partition: self.partition,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
        })
    }
}

impl<T> ChunkStepBuilder<T, T>
where
    T: Send + Sync + 'static,
{
    /// Writes items exactly as they were read.
    pub fn without_processor(self) -> Self {
        self.processor(PassThrough::new())
    }
}

/// Runs one chunk loop to completion outside of any job.
pub async fn run_chunks<I, O>(
    ctx: &StepContext,
    name: &str,
    reader: impl ItemReader<I> + 'static,
    processor: impl ItemProcessor<I, O> + 'static,
    writer: impl ItemWriter<O> + 'static,
    chunk_size: usize,
) -> Result<StepExecution, SettingsError>
where
    I: Send + 'static,
    O: Send + Sync + 'static,
{
    let step = ChunkStep::builder(name)
        .reader(reader)
        .processor(processor)
        .writer(writer)
        .chunk_size(chunk_size)
        .build()?;
    Ok(step.execute(ctx).await)
}
