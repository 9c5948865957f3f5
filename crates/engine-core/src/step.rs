use crate::state::{JobRepository, memory::InMemoryJobRepository, models::WalEntry};
use async_trait::async_trait;
use model::{core::identifiers::RunId, execution::step::StepExecution};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// One unit of a job: a tasklet, a chunk loop or a partitioned fan-out.
///
/// `execute` never returns an error: every failure is reported through the
/// returned execution's status and `last_error`.
#[async_trait]
pub trait Step: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &StepContext) -> StepExecution;
}

/// Everything a step needs from the job that runs it, passed explicitly.
#[derive(Clone)]
pub struct StepContext {
    pub run_id: RunId,
    pub cancel: CancellationToken,
    pub repository: Arc<dyn JobRepository>,
}

impl StepContext {
    pub fn new(run_id: RunId, repository: Arc<dyn JobRepository>, cancel: CancellationToken) -> Self {
        Self {
            run_id,
            cancel,
            repository,
        }
    }

    /// Context backed by a throwaway in-memory repository.
    pub fn detached(run_id: impl Into<RunId>) -> Self {
        Self::new(
            run_id.into(),
            Arc::new(InMemoryJobRepository::new()),
            CancellationToken::new(),
        )
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Appends to the WAL; bookkeeping failures are logged, never fatal.
    pub async fn record(&self, entry: WalEntry) {
        if let Err(err) = self.repository.append_wal(&entry).await {
            warn!(run_id = %self.run_id, error = %err, "Failed to append WAL entry");
        }
    }
}
