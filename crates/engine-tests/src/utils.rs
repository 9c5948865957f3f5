use chrono::{DateTime, Duration, Utc};
use connectors::memory::{fault::FaultPlan, sink::MemorySink, table::MemoryTable};
use engine_config::settings::validated::ValidatedSettings;
use engine_core::{
    connectors::{sink::ChunkSink, source::PagedSource, writer::ItemWriter},
    error::{BoxError, TaskletError},
    state::memory::InMemoryJobRepository,
    step::{Step, StepContext},
};
use engine_processing::{
    chunk::step::ChunkStep,
    reader::{list::ListItemReader, paging::PagingItemReader},
    transform::pipeline::map,
    writer::transactional::TransactionalWriter,
};
use engine_runtime::{
    job::Job,
    launcher::JobLauncher,
    partition::{bounds::PartitionBounds, factory::StepFactory, step::PartitionedStep},
    tasklet::{FnTasklet, TaskletStep},
};
use model::{
    execution::{job::JobExecution, partition::PartitionContext},
    records::user::User,
};
use std::{num::NonZeroUsize, sync::Arc};

/// `count` users with ids `1..=count`. Every user with an even id was last
/// updated three days before `now`, the others an hour before.
pub fn users(count: i64, now: DateTime<Utc>) -> Vec<User> {
    (1..=count)
        .map(|id| {
            let age = if id % 2 == 0 {
                Duration::days(3)
            } else {
                Duration::hours(1)
            };
            User::new(id, format!("user{id}"), 20 + (id % 50) as u32, now - age)
        })
        .collect()
}

pub fn settings(chunk_size: usize, partitions: usize, workers: usize) -> ValidatedSettings {
    ValidatedSettings::builder()
        .chunk_size(chunk_size)
        .partition_count(partitions)
        .partition_workers(workers)
        .build()
        .expect("valid settings")
}

pub fn sink_writer<T>(sink: &MemorySink<T>) -> Arc<dyn ItemWriter<T>>
where
    T: model::core::keyed::Keyed + Clone + Send + Sync + 'static,
{
    let sink: Arc<dyn ChunkSink<T>> = Arc::new(sink.clone());
    Arc::new(TransactionalWriter::new(sink))
}

/// Worker steps that copy the users of one partition into `sink`,
/// uppercasing user names and stamping them as refreshed at `now`.
pub fn refresh_factory(
    source: MemoryTable<User>,
    sink: MemorySink<User>,
    settings: ValidatedSettings,
    stale_before: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> impl StepFactory + 'static {
    let source: Arc<dyn PagedSource<User>> = Arc::new(source);
    let writer = sink_writer(&sink);

    move |name: &str, partition: &PartitionContext| -> Result<Box<dyn Step>, BoxError> {
        let page_size = NonZeroUsize::new(settings.page_size()).unwrap_or(NonZeroUsize::MIN);
        let reader = PagingItemReader::for_partition(source.clone(), page_size, partition)
            .with_updated_before(stale_before);
        let step = ChunkStep::builder(name)
            .reader(reader)
            .processor(map(move |user: User| User {
                username: user.username.to_uppercase(),
                ..user.refreshed(now)
            }))
            .shared_writer(writer.clone())
            .partition(*partition)
            .with_settings(&settings)
            .build()?;
        Ok(Box::new(step))
    }
}

pub fn refresh_step(
    name: &str,
    source: MemoryTable<User>,
    sink: MemorySink<User>,
    settings: &ValidatedSettings,
) -> PartitionedStep {
    let bounds = PartitionBounds::from_source(Arc::new(source.clone()) as Arc<dyn PagedSource<User>>);
    PartitionedStep::builder(name)
        .bounds(bounds)
        .factory(refresh_factory(source, sink, settings.clone(), None, Utc::now()))
        .with_settings(settings)
        .build()
        .expect("valid partitioned step")
}

/// Chunk step copying `items` into `sink`; every execution reads them anew.
pub fn copy_step(
    name: &str,
    items: impl IntoIterator<Item = i64>,
    sink: &MemorySink<i64>,
    chunk_size: usize,
) -> ChunkStep<i64, i64> {
    let items: Vec<i64> = items.into_iter().collect();
    ChunkStep::builder(name)
        .reader_factory(move || ListItemReader::new(items.clone()))
        .without_processor()
        .shared_writer(sink_writer(sink))
        .chunk_size(chunk_size)
        .build()
        .expect("valid chunk step")
}

pub fn failing_sink(plan: FaultPlan) -> MemorySink<i64> {
    MemorySink::with_faults(MemoryTable::new(), plan)
}

pub fn tasklet(name: &str, fail: bool) -> TaskletStep {
    TaskletStep::new(
        name,
        FnTasklet::new(move |_ctx: StepContext| async move {
            if fail {
                Err(TaskletError::Failed("tasklet asked to fail".into()))
            } else {
                Ok(())
            }
        }),
    )
}

pub async fn launch(job: &Job) -> (JobExecution, JobLauncher) {
    let launcher = JobLauncher::new(Arc::new(InMemoryJobRepository::new()));
    let execution = launcher.run(job).await;
    (execution, launcher)
}
