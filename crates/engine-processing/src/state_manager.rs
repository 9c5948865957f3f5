use crate::error::StateError;
use engine_core::{
    state::{
        JobRepository,
        models::{Checkpoint, CheckpointStage, WalEntry},
    },
    step::StepContext,
};
use model::core::identifiers::{PartitionId, RunId};
use std::sync::Arc;

/// Records the chunk lifecycle of one step execution: WAL entries plus the
/// step checkpoint.
///
/// A chunk is only written after [`begin_chunk`](Self::begin_chunk) has
/// succeeded, so a failure there fails the chunk. Commit and rollback records
/// come after the sink has already settled the chunk; callers log their
/// failures and keep the sink's outcome.
#[derive(Clone)]
pub struct StateManager {
    run_id: RunId,
    step: String,
    partition: Option<PartitionId>,
    repository: Arc<dyn JobRepository>,
}

impl StateManager {
    pub fn new(ctx: &StepContext, step: impl Into<String>, partition: Option<PartitionId>) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            step: step.into(),
            partition,
            repository: ctx.repository.clone(),
        }
    }

    pub async fn begin_chunk(
        &self,
        chunk_id: &str,
        seq: u64,
        items_done: u64,
    ) -> Result<(), StateError> {
        self.repository
            .append_wal(&WalEntry::ChunkBegin {
                run_id: self.run_id.to_string(),
                step: self.step.clone(),
                chunk_id: chunk_id.to_string(),
                seq,
            })
            .await
            .map_err(|e| StateError::WalOperation(e.to_string()))?;

        self.save_checkpoint(CheckpointStage::Begun, chunk_id, seq, items_done)
            .await
    }

    pub async fn commit_chunk(
        &self,
        chunk_id: &str,
        seq: u64,
        items: u64,
        items_done: u64,
    ) -> Result<(), StateError> {
        self.repository
            .append_wal(&WalEntry::ChunkCommit {
                run_id: self.run_id.to_string(),
                step: self.step.clone(),
                chunk_id: chunk_id.to_string(),
                seq,
                items,
            })
            .await
            .map_err(|e| StateError::WalOperation(e.to_string()))?;

        self.save_checkpoint(CheckpointStage::Committed, chunk_id, seq, items_done)
            .await
    }

    pub async fn rollback_chunk(
        &self,
        chunk_id: &str,
        seq: u64,
        error: &str,
        items_done: u64,
    ) -> Result<(), StateError> {
        self.repository
            .append_wal(&WalEntry::ChunkRollback {
                run_id: self.run_id.to_string(),
                step: self.step.clone(),
                chunk_id: chunk_id.to_string(),
                seq,
                error: error.to_string(),
            })
            .await
            .map_err(|e| StateError::WalOperation(e.to_string()))?;

        self.save_checkpoint(CheckpointStage::RolledBack, chunk_id, seq, items_done)
            .await
    }

    pub async fn load_checkpoint(&self) -> Result<Option<Checkpoint>, StateError> {
        self.repository
            .load_checkpoint(self.run_id.as_str(), &self.step)
            .await
            .map_err(|e| StateError::Checkpoint(e.to_string()))
    }

    async fn save_checkpoint(
        &self,
        stage: CheckpointStage,
        chunk_id: &str,
        seq: u64,
        items_done: u64,
    ) -> Result<(), StateError> {
        self.repository
            .save_checkpoint(&Checkpoint {
                run_id: self.run_id.to_string(),
                step: self.step.clone(),
                partition: self.partition,
                stage,
                chunk_id: chunk_id.to_string(),
                chunk_seq: seq,
                items_done,
                updated_at: chrono::Utc::now(),
            })
            .await
            .map_err(|e| StateError::Checkpoint(e.to_string()))
    }
}
