use crate::{
    error::{EngineError, PartitionError},
    partition::{bounds::PartitionBounds, factory::StepFactory, partitioner::partition_range},
};
use async_trait::async_trait;
use engine_config::settings::{error::SettingsError, validated::ValidatedSettings};
use engine_core::{
    pool::WorkerPool,
    state::models::WalEntry,
    step::{Step, StepContext},
};
use model::{
    core::identifiers::RunId,
    execution::{
        job::JobExecution, partition::PartitionContext, status::ExecutionStatus,
        step::StepExecution,
    },
};
use std::{num::NonZeroUsize, sync::Arc, time::Duration};
use tracing::{error, info, warn};

const DEFAULT_POOL_SIZE: usize = 5;
const DEFAULT_PARTITION_COUNT: usize = 3;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Master step: splits the key domain into partitions, runs one worker step
/// per partition on a bounded pool and folds the results into one execution.
///
/// The master never touches data itself. A failed partition does not stop
/// its siblings, but fails the master.
pub struct PartitionedStep {
    name: String,
    bounds: PartitionBounds,
    partition_count: NonZeroUsize,
    factory: Arc<dyn StepFactory>,
    pool_size: NonZeroUsize,
    shutdown_timeout: Duration,
}

struct Launched {
    name: String,
    partition: PartitionContext,
}

impl PartitionedStep {
    pub fn builder(name: impl Into<String>) -> PartitionedStepBuilder {
        PartitionedStepBuilder::new(name)
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count.get()
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size.get()
    }

    /// Name of the worker step that handles `partition`.
    pub fn worker_name(&self, partition: &PartitionContext) -> String {
        format!("{}:{}", self.name, partition.id().label())
    }

    /// Computes the partitions the next execution would run.
    pub async fn plan(&self) -> Result<Vec<PartitionContext>, PartitionError> {
        match self.bounds.resolve().await? {
            Some(range) => partition_range(range, self.partition_count.get()),
            None => Ok(Vec::new()),
        }
    }

    /// Runs the worker of a single partition again, e.g. after it failed.
    /// The result depends only on the partition's key range and the source.
    pub async fn run_partition(
        &self,
        partition: PartitionContext,
        ctx: &StepContext,
    ) -> StepExecution {
        let name = self.worker_name(&partition);
        match self.factory.create(&name, &partition) {
            Ok(step) => run_worker(step, name, partition, ctx.clone()).await,
            Err(source) => factory_failure(name, partition, source),
        }
    }

    fn aggregate(&self, execution: &mut StepExecution, ctx: &StepContext) {
        let total = execution.partitions.len();
        let mut failed = 0;
        for child in &execution.partitions {
            execution.counts += child.counts;
            if !child.is_success() {
                failed += 1;
            }
        }

        if failed > 0 {
            error!(
                run_id = %ctx.run_id,
                step = %self.name,
                failed,
                partitions = total,
                "Partitioned step failed"
            );
            execution.fail(format!("{failed} of {total} partitions failed"));
        } else {
            execution.complete();
            info!(
                run_id = %ctx.run_id,
                step = %self.name,
                partitions = total,
                read = execution.counts.read,
                written = execution.counts.written,
                duration_ms = execution.duration_ms().unwrap_or_default(),
                "Partitioned step completed"
            );
        }
    }
}

#[async_trait]
impl Step for PartitionedStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StepContext) -> StepExecution {
        let mut execution = StepExecution::new(&self.name);
        execution.start();

        let partitions = match self.plan().await {
            Ok(partitions) => partitions,
            Err(err) => {
                error!(run_id = %ctx.run_id, step = %self.name, error = %err, "Partitioning failed");
                execution.fail(err.to_string());
                return execution;
            }
        };

        info!(
            run_id = %ctx.run_id,
            step = %self.name,
            partitions = partitions.len(),
            pool_size = self.pool_size.get(),
            "Partitions computed"
        );

        let pool = WorkerPool::new(format!("{}-partition", self.name), self.pool_size);
        let mut launched = Vec::with_capacity(partitions.len());
        let mut handles = Vec::with_capacity(partitions.len());

        for partition in partitions {
            let name = self.worker_name(&partition);
            match self.factory.create(&name, &partition) {
                Ok(step) => {
                    handles.push(pool.spawn(run_worker(step, name.clone(), partition, ctx.clone())));
                    launched.push(Launched { name, partition });
                }
                Err(source) => {
                    execution
                        .partitions
                        .push(factory_failure(name, partition, source));
                }
            }
        }

        let results = pool.drain(handles, &ctx.cancel, self.shutdown_timeout).await;
        for (worker, result) in launched.into_iter().zip(results) {
            let child = match result {
                Some(Ok(child)) => child,
                Some(Err(join_err)) => {
                    let mut child = StepExecution::for_partition(worker.name, worker.partition);
                    child.fail(format!("worker panicked: {join_err}"));
                    child
                }
                None => {
                    warn!(
                        run_id = %ctx.run_id,
                        step = %worker.name,
                        partition_id = %worker.partition.id(),
                        "Partition abandoned after shutdown timeout"
                    );
                    let mut child = StepExecution::for_partition(worker.name, worker.partition);
                    child.fail("interrupted: partition did not finish before shutdown");
                    child
                }
            };
            execution.partitions.push(child);
        }

        execution
            .partitions
            .sort_by_key(|child| child.partition_id());
        self.aggregate(&mut execution, ctx);
        execution
    }
}

async fn run_worker(
    step: Box<dyn Step>,
    name: String,
    partition: PartitionContext,
    ctx: StepContext,
) -> StepExecution {
    let run_id = ctx.run_id.to_string();
    if ctx.is_cancelled() {
        warn!(run_id = %run_id, step = %name, partition_id = %partition.id(), "Partition not started, job is stopping");
        let mut child = StepExecution::for_partition(name, partition);
        child.fail("interrupted: partition not started");
        return child;
    }

    info!(
        run_id = %run_id,
        step = %name,
        partition_id = %partition.id(),
        range = %partition.range(),
        "Partition started"
    );
    ctx.record(WalEntry::PartitionStart {
        run_id: run_id.clone(),
        step: name.clone(),
        partition: partition.id(),
        range: partition.range(),
    })
    .await;

    let mut child = step.execute(&ctx).await;
    if child.partition.is_none() {
        child.partition = Some(partition);
    }

    ctx.record(WalEntry::PartitionDone {
        run_id: run_id.clone(),
        step: name.clone(),
        partition: partition.id(),
        status: child.status,
    })
    .await;

    if child.status == ExecutionStatus::Completed {
        info!(
            run_id = %run_id,
            step = %name,
            partition_id = %partition.id(),
            read = child.counts.read,
            written = child.counts.written,
            "Partition completed"
        );
    } else {
        error!(
            run_id = %run_id,
            step = %name,
            partition_id = %partition.id(),
            error = child.last_error.as_deref().unwrap_or("unknown"),
            "Partition failed"
        );
    }
    child
}

fn factory_failure(
    name: String,
    partition: PartitionContext,
    source: engine_core::error::BoxError,
) -> StepExecution {
    let err = PartitionError::Factory {
        partition: partition.id().label(),
        source,
    };
    error!(step = %name, partition_id = %partition.id(), error = %err, "Partition failed");
    let mut child = StepExecution::for_partition(name, partition);
    child.fail(err.to_string());
    child
}

/// Assembles a [`PartitionedStep`]. Bounds and a worker factory are required.
pub struct PartitionedStepBuilder {
    name: String,
    bounds: Option<PartitionBounds>,
    partition_count: Option<usize>,
    factory: Option<Arc<dyn StepFactory>>,
    pool_size: Option<usize>,
    shutdown_timeout: Option<Duration>,
}

impl PartitionedStepBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bounds: None,
            partition_count: None,
            factory: None,
            pool_size: None,
            shutdown_timeout: None,
        }
    }

    pub fn bounds(mut self, bounds: PartitionBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn partition_count(mut self, count: usize) -> Self {
        self.partition_count = Some(count);
        self
    }

    pub fn factory(mut self, factory: impl StepFactory + 'static) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = Some(timeout);
        self
    }

    /// Takes partition count, partition workers and shutdown timeout from
    /// `settings` unless they were set explicitly.
    pub fn with_settings(mut self, settings: &ValidatedSettings) -> Self {
        self.partition_count
            .get_or_insert(settings.partition_count());
        self.pool_size.get_or_insert(settings.partition_workers());
        self.shutdown_timeout
            .get_or_insert(settings.shutdown_timeout());
        self
    }

    pub fn build(self) -> Result<PartitionedStep, SettingsError> {
        let count = self.partition_count.unwrap_or(DEFAULT_PARTITION_COUNT);
        let partition_count =
            NonZeroUsize::new(count).ok_or(SettingsError::InvalidPartitionCount(count as i64))?;

        let size = self.pool_size.unwrap_or(DEFAULT_POOL_SIZE);
        let pool_size = NonZeroUsize::new(size).ok_or_else(|| SettingsError::InvalidPoolSize {
            pool: "partition_workers".to_string(),
            value: size as i64,
        })?;

        let missing = |component: &str| SettingsError::MissingComponent {
            step: self.name.clone(),
            component: component.to_string(),
        };
        let bounds = self.bounds.clone().ok_or_else(|| missing("partition bounds"))?;
        let factory = self.factory.clone().ok_or_else(|| missing("worker step factory"))?;

        Ok(PartitionedStep {
            name: self.name,
            bounds,
            partition_count,
            factory,
            pool_size,
            shutdown_timeout: self.shutdown_timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT),
        })
    }
}

/// Partitions `[min, max]`, runs every partition through `factory` on a pool
/// of `pool_size` slots and reports the outcome as a one-step job.
pub async fn run_partitioned(
    min: i64,
    max: i64,
    partition_count: usize,
    factory: impl StepFactory + 'static,
    pool_size: usize,
) -> Result<JobExecution, EngineError> {
    let step = PartitionedStep::builder("partitioned")
        .bounds(PartitionBounds::fixed(min, max))
        .partition_count(partition_count)
        .factory(factory)
        .pool_size(pool_size)
        .build()?;

    let ctx = StepContext::detached(RunId::generate());
    let mut job = JobExecution::new(ctx.run_id.to_string(), "partitioned");
    job.start();
    job.record_step(step.execute(&ctx).await);
    job.finish();
    Ok(job)
}
