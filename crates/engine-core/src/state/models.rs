use chrono::{DateTime, Utc};
use model::{
    core::identifiers::PartitionId, execution::status::ExecutionStatus,
    pagination::key_range::KeyRange,
};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckpointStage {
    Begun,
    Committed,
    RolledBack,
}

impl CheckpointStage {
    /// Order: Begun (1) < Committed | RolledBack (2)
    fn rank(&self) -> u8 {
        match self {
            CheckpointStage::Begun => 1,
            CheckpointStage::Committed | CheckpointStage::RolledBack => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStage::Begun => "begun",
            CheckpointStage::Committed => "committed",
            CheckpointStage::RolledBack => "rolled_back",
        }
    }
}

/// Last chunk reached by one step execution.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Checkpoint {
    pub run_id: String,
    pub step: String,
    pub partition: Option<PartitionId>,
    pub stage: CheckpointStage,
    pub chunk_id: String,
    pub chunk_seq: u64,
    pub items_done: u64,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Whether `self` may replace `existing`: checkpoints only move forward.
    /// A later chunk always wins; for the same chunk the stage may not regress.
    pub fn supersedes(&self, existing: &Checkpoint) -> bool {
        if self.chunk_seq != existing.chunk_seq {
            return self.chunk_seq > existing.chunk_seq;
        }
        self.stage.rank() >= existing.stage.rank()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum WalEntry {
    JobStart {
        run_id: String,
        job: String,
    },
    StepStart {
        run_id: String,
        step: String,
    },
    PartitionStart {
        run_id: String,
        step: String,
        partition: PartitionId,
        range: KeyRange,
    },
    ChunkBegin {
        run_id: String,
        step: String,
        chunk_id: String,
        seq: u64,
    },
    ChunkCommit {
        run_id: String,
        step: String,
        chunk_id: String,
        seq: u64,
        items: u64,
    },
    ChunkRollback {
        run_id: String,
        step: String,
        chunk_id: String,
        seq: u64,
        error: String,
    },
    PartitionDone {
        run_id: String,
        step: String,
        partition: PartitionId,
        status: ExecutionStatus,
    },
    StepDone {
        run_id: String,
        step: String,
        status: ExecutionStatus,
    },
    JobDone {
        run_id: String,
        status: ExecutionStatus,
    },
}

impl WalEntry {
    pub fn run_id(&self) -> &str {
        match self {
            WalEntry::JobStart { run_id, .. } => run_id,
            WalEntry::StepStart { run_id, .. } => run_id,
            WalEntry::PartitionStart { run_id, .. } => run_id,
            WalEntry::ChunkBegin { run_id, .. } => run_id,
            WalEntry::ChunkCommit { run_id, .. } => run_id,
            WalEntry::ChunkRollback { run_id, .. } => run_id,
            WalEntry::PartitionDone { run_id, .. } => run_id,
            WalEntry::StepDone { run_id, .. } => run_id,
            WalEntry::JobDone { run_id, .. } => run_id,
        }
    }
}
