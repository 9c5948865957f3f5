use async_trait::async_trait;
use engine_core::{
    error::TaskletError,
    step::{Step, StepContext},
};
use model::execution::step::StepExecution;
use std::future::Future;
use tracing::{error, info};

/// Work that runs exactly once per step execution, without chunking.
#[async_trait]
pub trait Tasklet: Send + Sync {
    async fn run(&self, ctx: &StepContext) -> Result<(), TaskletError>;
}

/// Adapts an async closure into a [`Tasklet`]. The closure gets its own
/// clone of the step context.
pub struct FnTasklet<F> {
    f: F,
}

impl<F, Fut> FnTasklet<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskletError>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Tasklet for FnTasklet<F>
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), TaskletError>> + Send + 'static,
{
    async fn run(&self, ctx: &StepContext) -> Result<(), TaskletError> {
        (self.f)(ctx.clone()).await
    }
}

/// Step that runs a single [`Tasklet`].
pub struct TaskletStep {
    name: String,
    tasklet: Box<dyn Tasklet>,
}

impl TaskletStep {
    pub fn new(name: impl Into<String>, tasklet: impl Tasklet + 'static) -> Self {
        Self {
            name: name.into(),
            tasklet: Box::new(tasklet),
        }
    }
}

#[async_trait]
impl Step for TaskletStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StepContext) -> StepExecution {
        let mut execution = StepExecution::new(&self.name);
        execution.start();

        match self.tasklet.run(ctx).await {
            Ok(()) => {
                execution.complete();
                info!(
                    run_id = %ctx.run_id,
                    step = %self.name,
                    duration_ms = execution.duration_ms().unwrap_or_default(),
                    "Tasklet completed"
                );
            }
            Err(err) => {
                error!(run_id = %ctx.run_id, step = %self.name, error = %err, "Tasklet failed");
                execution.fail(err.to_string());
            }
        }
        execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use model::execution::status::ExecutionStatus;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    struct Hello;

    #[async_trait]
    impl Tasklet for Hello {
        async fn run(&self, ctx: &StepContext) -> Result<(), TaskletError> {
            info!(run_id = %ctx.run_id, "Hello, batch");
            Ok(())
        }
    }

    #[tokio::test]
    async fn runs_once_and_completes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let step = TaskletStep::new(
            "count",
            FnTasklet::new(move |_ctx: StepContext| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );

        let exec = step.execute(&StepContext::detached("run-1")).await;

        assert_eq!(exec.status, ExecutionStatus::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(exec.counts.read, 0);
    }

    #[tokio::test]
    async fn struct_tasklets_work_too() {
        let exec = TaskletStep::new("hello", Hello)
            .execute(&StepContext::detached("run-1"))
            .await;
        assert!(exec.is_success());
    }

    #[tokio::test]
    async fn error_fails_the_step() {
        let step = TaskletStep::new(
            "broken",
            FnTasklet::new(|_ctx: StepContext| async {
                Err(TaskletError::Failed("no input file".into()))
            }),
        );

        let exec = step.execute(&StepContext::detached("run-1")).await;

        assert_eq!(exec.status, ExecutionStatus::Failed);
        assert!(exec.last_error.unwrap().contains("no input file"));
    }
}
