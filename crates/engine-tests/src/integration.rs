#[cfg(test)]
mod tests {
    use crate::utils::{
        copy_step, failing_sink, launch, refresh_factory, refresh_step, settings, sink_writer,
        tasklet, users,
    };
    use chrono::{Duration, Utc};
    use connectors::memory::{fault::FaultPlan, sink::MemorySink, table::MemoryTable};
    use engine_core::{
        connectors::source::PagedSource,
        progress::{ProgressService, ProgressStage},
        state::{JobRepository, sled_store::SledJobRepository},
        step::{Step, StepContext},
    };
    use engine_processing::{
        chunk::step::ChunkStep, reader::list::ListItemReader, transform::pipeline::filter,
    };
    use engine_runtime::{
        job::Job,
        launcher::JobLauncher,
        partition::{bounds::PartitionBounds, partitioner::compute_partitions, step::PartitionedStep},
    };
    use model::{
        execution::status::ExecutionStatus, pagination::key_range::KeyRange,
        records::user::User,
    };
    use std::sync::Arc;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    // Scenario: 12 items, chunk size 10.
    // Expected: two chunks committed (10 and 2), 12 items written.
    #[traced_test]
    #[tokio::test]
    async fn twelve_items_make_two_chunks() {
        let sink = MemorySink::new(MemoryTable::new());
        let job = Job::builder("copy")
            .start(copy_step("copy", 1..=12, &sink, 10))
            .build()
            .unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        let step = execution.step("copy").unwrap();
        assert_eq!(step.counts.commits, 2);
        assert_eq!(step.items_written(), 12);
        assert_eq!(sink.commits(), 2);
        assert!(logs_contain("Chunk committed"));
        assert!(logs_contain("Job completed"));
    }

    // Scenario: the writer fails on the third chunk.
    // Expected: the first two chunks stay committed, nothing of the third is visible.
    #[traced_test]
    #[tokio::test]
    async fn failed_chunk_leaves_earlier_chunks_committed() {
        let sink = failing_sink(FaultPlan::FailCommit(2));
        let job = Job::builder("copy")
            .start(copy_step("copy", 1..=50, &sink, 10))
            .build()
            .unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(sink.table().keys().await, (1..=20).collect::<Vec<_>>());
        let step = execution.step("copy").unwrap();
        assert_eq!(step.counts.commits, 2);
        assert_eq!(step.counts.rollbacks, 1);
        assert!(logs_contain("Chunk rolled back"));
    }

    // Scenario: a processor drops odd numbers.
    // Expected: read == written + filtered.
    #[traced_test]
    #[tokio::test]
    async fn read_equals_written_plus_filtered() {
        let sink = MemorySink::new(MemoryTable::new());
        let step = ChunkStep::builder("evens")
            .reader(ListItemReader::new(1..=95i64))
            .processor(filter(|n: &i64| n % 2 == 0))
            .shared_writer(sink_writer(&sink))
            .chunk_size(10)
            .build()
            .unwrap();
        let job = Job::builder("evens").start(step).build().unwrap();

        let (execution, _) = launch(&job).await;

        let counts = execution.totals();
        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(counts.read, 95);
        assert_eq!(counts.written, 47);
        assert_eq!(counts.filtered, 48);
        assert_eq!(counts.read, counts.written + counts.filtered);
        assert_eq!(sink.table().len().await, 47);
    }

    // Scenario: three steps, the second fails.
    // Expected: the third never runs and the job fails.
    #[traced_test]
    #[tokio::test]
    async fn failed_step_stops_the_job() {
        let sink = MemorySink::new(MemoryTable::new());
        let job = Job::builder("flow")
            .start(tasklet("prepare", false))
            .next(tasklet("validate", true))
            .next(copy_step("copy", 1..=5, &sink, 2))
            .build()
            .unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.steps.len(), 2);
        assert!(execution.step("copy").is_none());
        assert!(sink.table().is_empty().await);
        assert!(logs_contain("Step failed, skipping remaining steps"));
    }

    // Scenario: 3 partitions over 90 users, the sink rejects keys of the middle partition.
    // Expected: job FAILED, the outer partitions COMPLETED with 30 items each.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failing_partition_does_not_affect_siblings() {
        let source = MemoryTable::from_items(users(90, Utc::now()));
        let sink = MemorySink::with_faults(
            MemoryTable::new(),
            FaultPlan::RejectKeys(KeyRange::new(40, 40)),
        );
        let settings = settings(10, 3, 3);
        let job = Job::builder("refresh")
            .start(refresh_step("refresh", source, sink.clone(), &settings))
            .build()
            .unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        let master = execution.step("refresh").unwrap();
        assert_eq!(master.partitions.len(), 3);

        let outcome: Vec<_> = master
            .partitions
            .iter()
            .map(|p| (p.step_name.as_str(), p.status, p.items_written()))
            .collect();
        assert_eq!(outcome[0], ("refresh:partition0", ExecutionStatus::Completed, 30));
        assert_eq!(outcome[1].1, ExecutionStatus::Failed);
        assert_eq!(outcome[2], ("refresh:partition2", ExecutionStatus::Completed, 30));

        let failures = execution.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].step_name, "refresh:partition1");

        // Partition 1 is [31, 60]; the chunk holding key 40 never commits.
        let written = sink.table().keys().await;
        assert!(!written.iter().any(|k| (31..=40).contains(k)));
        assert!(written.contains(&1) && written.contains(&90));
        assert!(logs_contain("Partition failed"));
        assert!(logs_contain("Partitioned step failed"));
    }

    // Scenario: one partition is re-run against the same source.
    // Expected: same item set and count as in the full run.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn rerun_of_a_partition_is_idempotent() {
        let now = Utc::now();
        let source = MemoryTable::from_items(users(100, now));
        let settings = settings(7, 3, 3);

        let full_sink = MemorySink::new(MemoryTable::new());
        let master = PartitionedStep::builder("refresh")
            .bounds(PartitionBounds::fixed(1, 100))
            .factory(refresh_factory(
                source.clone(),
                full_sink.clone(),
                settings.clone(),
                None,
                now,
            ))
            .with_settings(&settings)
            .build()
            .unwrap();
        let ctx = StepContext::detached("run-full");
        let full = master.execute(&ctx).await;
        assert!(full.is_success());

        let rerun_sink = MemorySink::new(MemoryTable::new());
        let rerun_master = PartitionedStep::builder("refresh")
            .bounds(PartitionBounds::fixed(1, 100))
            .factory(refresh_factory(source, rerun_sink.clone(), settings.clone(), None, now))
            .with_settings(&settings)
            .build()
            .unwrap();
        let partition = rerun_master.plan().await.unwrap()[1];
        let rerun = rerun_master
            .run_partition(partition, &StepContext::detached("run-rerun"))
            .await;

        assert!(rerun.is_success());
        assert_eq!(rerun.items_written(), full.partitions[1].items_written());

        let expected: Vec<User> = full_sink
            .table()
            .snapshot()
            .await
            .into_iter()
            .filter(|u| partition.range().contains(u.id))
            .collect();
        assert_eq!(rerun_sink.table().snapshot().await, expected);
    }

    // Scenario: empty source.
    // Expected: zero partitions and a completed job.
    #[traced_test]
    #[tokio::test]
    async fn empty_source_yields_no_partitions() {
        let sink = MemorySink::new(MemoryTable::new());
        let job = Job::builder("refresh")
            .start(refresh_step(
                "refresh",
                MemoryTable::new(),
                sink,
                &settings(10, 3, 3),
            ))
            .build()
            .unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert!(execution.step("refresh").unwrap().partitions.is_empty());
    }

    // Scenario: only users last updated more than a day ago are refreshed.
    // Expected: exactly the even ids land in the sink, uppercased.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stale_filter_selects_old_records_only() {
        let now = Utc::now();
        let source = MemoryTable::from_items(users(40, now));
        let sink = MemorySink::new(MemoryTable::new());
        let settings = settings(5, 2, 2);
        let step = PartitionedStep::builder("stale")
            .bounds(PartitionBounds::from_source(
                Arc::new(source.clone()) as Arc<dyn PagedSource<User>>
            ))
            .factory(refresh_factory(
                source,
                sink.clone(),
                settings.clone(),
                Some(now - Duration::days(1)),
                now,
            ))
            .with_settings(&settings)
            .build()
            .unwrap();
        let job = Job::builder("stale").start(step).build().unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(execution.totals().written, 20);
        let refreshed = sink.table().snapshot().await;
        assert!(refreshed.iter().all(|u| u.id % 2 == 0));
        assert!(refreshed.iter().all(|u| u.username == format!("USER{}", u.id)));
        assert!(refreshed.iter().all(|u| u.last_updated == now));
    }

    // Scenario: chunk step with four workers over a large list.
    // Expected: every item written exactly once.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn multi_threaded_chunk_step_writes_everything() {
        let sink = MemorySink::new(MemoryTable::new());
        let step = ChunkStep::builder("parallel")
            .reader(ListItemReader::new(1..=2_000i64))
            .without_processor()
            .shared_writer(sink_writer(&sink))
            .chunk_size(10)
            .concurrency(4)
            .build()
            .unwrap();
        let job = Job::builder("parallel").start(step).build().unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(sink.table().len().await, 2_000);
        assert_eq!(sink.commits(), 200);
        assert!(logs_contain("worker"));
    }

    // Scenario: four chunk workers, the fourth chunk fails to commit.
    // Expected: the step fails, chunks in flight finish, the failed one is not visible.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn multi_threaded_chunk_failure_stops_new_chunks() {
        let sink = failing_sink(FaultPlan::FailCommit(3));
        let step = ChunkStep::builder("parallel")
            .reader(ListItemReader::new(1..=1_000i64))
            .without_processor()
            .shared_writer(sink_writer(&sink))
            .chunk_size(10)
            .concurrency(4)
            .build()
            .unwrap();
        let job = Job::builder("parallel").start(step).build().unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        let counts = execution.step("parallel").unwrap().counts;
        assert_eq!(counts.rollbacks, 1);
        // Only chunks assembled before the failure was seen ever ran.
        assert!(counts.read < 1_000);
        assert_eq!(counts.written, counts.commits * 10);
        assert_eq!(sink.commits(), counts.commits);
        assert_eq!(sink.table().len().await as u64, counts.written);
        assert_eq!(counts.unaccounted(), 10);
        assert!(logs_contain("Chunk rolled back"));
    }

    // Scenario: the same job launched twice.
    // Expected: both runs read and write every item.
    #[traced_test]
    #[tokio::test]
    async fn relaunched_job_reads_its_source_again() {
        let sink = MemorySink::new(MemoryTable::new());
        let job = Job::builder("copy")
            .start(copy_step("copy", 1..=12, &sink, 10))
            .build()
            .unwrap();
        let launcher = JobLauncher::in_memory();

        let first = launcher.run(&job).await;
        let second = launcher.run(&job).await;

        for execution in [&first, &second] {
            assert_eq!(execution.status, ExecutionStatus::Completed);
            let counts = execution.step("copy").unwrap().counts;
            assert_eq!(counts.read, 12);
            assert_eq!(counts.written, 12);
        }
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(sink.commits(), 4);
    }

    // Scenario: a job whose step was built around a single reader, launched twice.
    // Expected: the second run fails loudly instead of reading nothing.
    #[traced_test]
    #[tokio::test]
    async fn relaunching_a_single_reader_step_fails() {
        let sink = MemorySink::new(MemoryTable::new());
        let step = ChunkStep::builder("copy")
            .reader(ListItemReader::new(1..=12i64))
            .without_processor()
            .shared_writer(sink_writer(&sink))
            .chunk_size(10)
            .build()
            .unwrap();
        let job = Job::builder("copy").start(step).build().unwrap();
        let launcher = JobLauncher::in_memory();

        let first = launcher.run(&job).await;
        let second = launcher.run(&job).await;

        assert_eq!(first.status, ExecutionStatus::Completed);
        assert_eq!(second.status, ExecutionStatus::Failed);
        let failed = second.step("copy").unwrap();
        assert_eq!(failed.counts.read, 0);
        assert!(failed.last_error.as_deref().unwrap().contains("consumed"));
        assert_eq!(sink.table().len().await, 12);
    }

    // Scenario: partitions with more slots than the source connection limit.
    // Expected: workers wait for connections, the job still completes.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_connection_limit_is_backpressure_not_failure() {
        let source = MemoryTable::from_items(users(60, Utc::now())).with_connection_limit(1);
        let sink = MemorySink::new(MemoryTable::new());
        let job = Job::builder("refresh")
            .start(refresh_step("refresh", source, sink.clone(), &settings(5, 6, 6)))
            .build()
            .unwrap();

        let (execution, _) = launch(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Completed);
        assert_eq!(sink.table().len().await, 60);
    }

    // Scenario: the launcher is stopped before the job starts.
    // Expected: no step runs and the job is FAILED as interrupted.
    #[traced_test]
    #[tokio::test]
    async fn stopped_launcher_runs_nothing() {
        let sink = MemorySink::new(MemoryTable::new());
        let job = Job::builder("copy")
            .start(copy_step("copy", 1..=10, &sink, 5))
            .build()
            .unwrap();

        let launcher = JobLauncher::in_memory();
        launcher.stop();
        let execution = launcher.run(&job).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(sink.table().is_empty().await);
        assert!(logs_contain("Stop requested"));
    }

    // Scenario: a partitioned job persisted to sled.
    // Expected: progress derived from the WAL matches the execution.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn progress_reflects_the_persisted_run() {
        let dir = tempdir().unwrap();
        let repository = Arc::new(SledJobRepository::open(dir.path().join("state")).unwrap());
        let source = MemoryTable::from_items(users(30, Utc::now()));
        let sink = MemorySink::new(MemoryTable::new());
        let job = Job::builder("refresh")
            .start(tasklet("prepare", false))
            .next(refresh_step("refresh", source, sink, &settings(10, 3, 2)))
            .build()
            .unwrap();

        let launcher = JobLauncher::new(repository.clone());
        let execution = launcher.run(&job).await;
        assert_eq!(execution.status, ExecutionStatus::Completed);

        let status = ProgressService::new(repository.clone())
            .job_status(&execution.run_id)
            .await
            .unwrap();
        assert_eq!(status.stage, ProgressStage::Done);
        assert_eq!(status.progress.steps_finished, 2);
        assert_eq!(status.progress.partitions_started, 3);
        assert_eq!(status.progress.partitions_finished, 3);
        assert_eq!(status.progress.items_written, 30);

        let stored = repository.load_job(&execution.run_id).await.unwrap().unwrap();
        assert_eq!(stored.totals().written, 30);
    }

    #[test]
    fn partitioner_example_from_the_docs() {
        let parts = compute_partitions(1, 100, 3).unwrap();
        let ranges: Vec<_> = parts.iter().map(|p| p.range()).collect();
        assert_eq!(
            ranges,
            vec![KeyRange::new(1, 34), KeyRange::new(35, 68), KeyRange::new(69, 100)]
        );
    }
}
