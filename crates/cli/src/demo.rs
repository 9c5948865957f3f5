use chrono::{DateTime, Duration, Utc};
use connectors::memory::{fault::FaultPlan, sink::MemorySink, table::MemoryTable};
use engine_config::settings::validated::ValidatedSettings;
use engine_core::{
    connectors::{sink::ChunkSink, source::PagedSource, writer::ItemWriter},
    error::{BoxError, TaskletError},
    step::{Step, StepContext},
};
use engine_processing::{
    chunk::step::ChunkStep,
    reader::paging::PagingItemReader,
    transform::pipeline::{ProcessorPipeline, ProcessorPipelineExt, filter, map},
    writer::{retry::RetryingWriter, transactional::TransactionalWriter},
};
use engine_runtime::{
    error::EngineError,
    job::Job,
    partition::{
        bounds::PartitionBounds, partitioner::compute_partitions, step::PartitionedStep,
    },
    tasklet::{FnTasklet, TaskletStep},
};
use model::{execution::partition::PartitionContext, records::user::User};
use std::{num::NonZeroUsize, sync::Arc};
use tracing::{info, warn};

pub struct DemoOptions {
    pub users: i64,
    pub fail_partition: Option<usize>,
}

/// Users `1..=count`; two out of three were last updated days ago.
fn generate_users(count: i64, now: DateTime<Utc>) -> Vec<User> {
    (1..=count)
        .map(|id| {
            let last_updated = if id % 3 == 0 {
                now - Duration::minutes(id % 60)
            } else {
                now - Duration::days(2 + id % 5)
            };
            User::new(id, format!("user{id}"), 18 + (id % 60) as u32, last_updated)
        })
        .collect()
}

/// Builds the three-step demo job: fill the user table, refresh stale users
/// partition by partition, report what was written.
pub fn build_job(settings: &ValidatedSettings, options: &DemoOptions) -> Result<Job, EngineError> {
    let now = Utc::now();
    let source = MemoryTable::<User>::new();
    let faults = match options.fail_partition {
        Some(index) => {
            let partitions = compute_partitions(1, options.users, settings.partition_count())?;
            match partitions.get(index) {
                Some(partition) => {
                    info!(partition = %partition, "Injecting write failures");
                    FaultPlan::RejectKeys(partition.range())
                }
                None => {
                    warn!(index, partitions = partitions.len(), "No such partition, nothing injected");
                    FaultPlan::None
                }
            }
        }
        None => FaultPlan::None,
    };
    let sink = MemorySink::with_faults(MemoryTable::<User>::new(), faults);

    let prepare = {
        let table = source.clone();
        let users = options.users;
        TaskletStep::new(
            "prepare",
            FnTasklet::new(move |ctx: StepContext| {
                let table = table.clone();
                async move {
                    table.upsert_all(generate_users(users, now)).await;
                    let rows = table.len().await;
                    info!(run_id = %ctx.run_id, users = rows, "User table ready");
                    Ok::<(), TaskletError>(())
                }
            }),
        )
    };

    let refresh = PartitionedStep::builder("refresh")
        .bounds(PartitionBounds::from_source(
            Arc::new(source.clone()) as Arc<dyn PagedSource<User>>
        ))
        .factory(refresh_factory(source, sink.clone(), settings.clone(), now))
        .with_settings(settings)
        .build()?;

    let report = {
        let sink = sink.clone();
        TaskletStep::new(
            "report",
            FnTasklet::new(move |ctx: StepContext| {
                let sink = sink.clone();
                async move {
                    let refreshed = sink.table().len().await;
                    info!(
                        run_id = %ctx.run_id,
                        refreshed,
                        commits = sink.commits(),
                        rollbacks = sink.rollbacks(),
                        "Refresh report"
                    );
                    Ok::<(), TaskletError>(())
                }
            }),
        )
    };

    Job::builder("user-refresh")
        .start(prepare)
        .next(refresh)
        .next(report)
        .build()
}

fn refresh_factory(
    source: MemoryTable<User>,
    sink: MemorySink<User>,
    settings: ValidatedSettings,
    now: DateTime<Utc>,
) -> impl Fn(&str, &PartitionContext) -> Result<Box<dyn Step>, BoxError> + Send + Sync + 'static {
    let source: Arc<dyn PagedSource<User>> = Arc::new(source);
    let sink: Arc<dyn ChunkSink<User>> = Arc::new(sink);
    let writer: Arc<dyn ItemWriter<User>> = Arc::new(RetryingWriter::new(
        Arc::new(TransactionalWriter::new(sink)),
        settings.retry().clone(),
    ));
    let stale_before = settings.stale_threshold(now);

    move |name: &str, partition: &PartitionContext| -> Result<Box<dyn Step>, BoxError> {
        let page_size = NonZeroUsize::new(settings.page_size()).unwrap_or(NonZeroUsize::MIN);
        let reader = PagingItemReader::for_partition(source.clone(), page_size, partition)
            .with_updated_before(stale_before)
            .with_retry(settings.retry().clone());

        let processor = ProcessorPipeline::new()
            .add_stage(filter(|user: &User| !user.username.is_empty()))
            .add_if(stale_before.is_none(), || {
                filter(move |user: &User| user.last_updated < now)
            })
            .add_stage(map(move |user: User| User {
                username: user.username.to_uppercase(),
                ..user.refreshed(now)
            }));

        let step = ChunkStep::builder(name)
            .reader(reader)
            .processor(processor)
            .shared_writer(writer.clone())
            .partition(*partition)
            .with_settings(&settings)
            .build()?;
        Ok(Box::new(step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine_runtime::launcher::JobLauncher;
    use model::execution::status::ExecutionStatus;

    fn settings() -> ValidatedSettings {
        ValidatedSettings::builder()
            .chunk_size(10)
            .partition_count(3)
            .stale_after(std::time::Duration::from_secs(24 * 60 * 60))
            .build()
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn demo_job_refreshes_stale_users() {
        let job = build_job(
            &settings(),
            &DemoOptions {
                users: 90,
                fail_partition: None,
            },
        )
        .unwrap();

        let execution = JobLauncher::in_memory().run(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        let refresh = execution.step("refresh").unwrap();
        assert_eq!(refresh.partitions.len(), 3);
        assert_eq!(refresh.counts.written, 60);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn injected_fault_fails_one_partition() {
        let job = build_job(
            &settings(),
            &DemoOptions {
                users: 90,
                fail_partition: Some(2),
            },
        )
        .unwrap();

        let execution = JobLauncher::in_memory().run(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.step("report").is_none());
        let failures = execution.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step_name, "refresh:partition2");
    }
}
