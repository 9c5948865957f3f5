use crate::{
    error::StateStoreError,
    state::models::{Checkpoint, WalEntry},
};
use async_trait::async_trait;
use model::execution::job::JobExecution;

pub mod memory;
pub mod models;
pub mod sled_store;

/// Durable record of job executions, step checkpoints and the write-ahead log.
#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn save_job(&self, job: &JobExecution) -> Result<(), StateStoreError>;

    async fn load_job(&self, run_id: &str) -> Result<Option<JobExecution>, StateStoreError>;

    /// All stored executions, oldest first.
    async fn list_jobs(&self) -> Result<Vec<JobExecution>, StateStoreError>;

    /// Stores `cp` unless the stored checkpoint for the same step is further
    /// ahead (see [`Checkpoint::supersedes`]).
    async fn save_checkpoint(&self, cp: &Checkpoint) -> Result<(), StateStoreError>;

    async fn load_checkpoint(
        &self,
        run_id: &str,
        step: &str,
    ) -> Result<Option<Checkpoint>, StateStoreError>;

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), StateStoreError>;

    /// WAL entries of `run_id` in append order.
    async fn iter_wal(&self, run_id: &str) -> Result<Vec<WalEntry>, StateStoreError>;
}
