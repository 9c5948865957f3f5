use crate::{error::EngineError, job::Job};
use engine_core::{
    state::{JobRepository, memory::InMemoryJobRepository, models::WalEntry},
    step::StepContext,
};
use model::{
    core::identifiers::RunId,
    execution::{job::JobExecution, status::ExecutionStatus},
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs jobs: steps strictly in order, stopping at the first failed step.
///
/// Every launch gets a fresh run id. The execution is saved to the
/// repository after each step and once more when the job ends.
#[derive(Clone)]
pub struct JobLauncher {
    repository: Arc<dyn JobRepository>,
    cancel: CancellationToken,
}

impl JobLauncher {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self {
            repository,
            cancel: CancellationToken::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryJobRepository::new()))
    }

    /// Uses `cancel` instead of the launcher's own token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn repository(&self) -> Arc<dyn JobRepository> {
        self.repository.clone()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Asks running jobs to stop. Steps, partitions and chunks already
    /// running finish; nothing new starts.
    pub fn stop(&self) {
        info!("Stop requested");
        self.cancel.cancel();
    }

    pub async fn run(&self, job: &Job) -> JobExecution {
        self.run_with_id(job, RunId::generate()).await
    }

    pub async fn run_with_id(&self, job: &Job, run_id: RunId) -> JobExecution {
        let ctx = StepContext::new(run_id.clone(), self.repository.clone(), self.cancel.clone());
        let mut execution = JobExecution::new(run_id.to_string(), job.name());
        execution.start();

        info!(run_id = %run_id, job = %job.name(), steps = job.steps().len(), "Job started");
        ctx.record(WalEntry::JobStart {
            run_id: run_id.to_string(),
            job: job.name().to_string(),
        })
        .await;
        self.save(&execution).await;

        let total = job.steps().len();
        for (idx, step) in job.steps().iter().enumerate() {
            if ctx.is_cancelled() {
                warn!(
                    run_id = %run_id,
                    step = %step.name(),
                    "Stop requested before step {}/{}",
                    idx + 1,
                    total
                );
                execution.fail(format!(
                    "interrupted: stopped before step '{}'",
                    step.name()
                ));
                break;
            }

            info!(run_id = %run_id, step = %step.name(), "Running step {}/{}", idx + 1, total);
            ctx.record(WalEntry::StepStart {
                run_id: run_id.to_string(),
                step: step.name().to_string(),
            })
            .await;

            let step_execution = step.execute(&ctx).await;
            let succeeded = step_execution.is_success();

            ctx.record(WalEntry::StepDone {
                run_id: run_id.to_string(),
                step: step.name().to_string(),
                status: step_execution.status,
            })
            .await;
            execution.record_step(step_execution);
            self.save(&execution).await;

            if !succeeded {
                warn!(
                    run_id = %run_id,
                    step = %step.name(),
                    skipped = total - idx - 1,
                    "Step failed, skipping remaining steps"
                );
                break;
            }
        }

        execution.finish();
        ctx.record(WalEntry::JobDone {
            run_id: run_id.to_string(),
            status: execution.status,
        })
        .await;
        self.save(&execution).await;

        let totals = execution.totals();
        if execution.status == ExecutionStatus::Completed {
            info!(
                run_id = %run_id,
                job = %job.name(),
                read = totals.read,
                written = totals.written,
                filtered = totals.filtered,
                "Job completed"
            );
        } else {
            for failure in execution.failures() {
                error!(
                    run_id = %run_id,
                    step = %failure.step_name,
                    partition_id = %failure.partition.map(|p| p.label()).unwrap_or_default(),
                    error = %failure.error,
                    "Job failure"
                );
            }
            error!(run_id = %run_id, job = %job.name(), "Job failed");
        }
        execution
    }

    /// Runs `job` on a dedicated multi-threaded runtime, for callers that
    /// have none. Must not be called from inside an async context.
    pub fn run_blocking(&self, job: &Job) -> Result<JobExecution, EngineError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(EngineError::Runtime)?;
        Ok(runtime.block_on(self.run(job)))
    }

    async fn save(&self, execution: &JobExecution) {
        if let Err(err) = self.repository.save_job(execution).await {
            warn!(run_id = %execution.run_id, error = %err, "Failed to save job execution");
        }
    }
}
