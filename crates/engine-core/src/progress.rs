use crate::{
    error::ProgressError,
    state::{JobRepository, models::WalEntry},
};
use model::execution::status::ExecutionStatus;
use serde::Serialize;
use std::{collections::BTreeSet, fmt, sync::Arc};

#[derive(Clone)]
pub struct ProgressService {
    pub repository: Arc<dyn JobRepository>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressStage {
    Idle,
    Running,
    Done,
    Failed,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Idle => "Idle",
            ProgressStage::Running => "Running",
            ProgressStage::Done => "Done",
            ProgressStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobProgress {
    pub steps_started: usize,
    pub steps_finished: usize,
    pub chunks_begun: u64,
    pub chunks_committed: u64,
    pub chunks_rolled_back: u64,
    pub items_written: u64,
    pub partitions_started: usize,
    pub partitions_finished: usize,
    pub partitions_failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressStatus {
    pub run_id: String,
    pub stage: ProgressStage,
    pub progress: JobProgress,
    pub last_error: Option<String>,
}

impl ProgressService {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        ProgressService { repository }
    }

    /// Derives where a run stands from its WAL, falling back on the stored
    /// execution for the final verdict.
    pub async fn job_status(&self, run_id: &str) -> Result<ProgressStatus, ProgressError> {
        let wal = self
            .repository
            .iter_wal(run_id)
            .await
            .map_err(|e| ProgressError::Wal(e.to_string()))?;
        let stored = self
            .repository
            .load_job(run_id)
            .await
            .map_err(|e| ProgressError::LoadJob(e.to_string()))?;

        let mut progress = JobProgress::default();
        let mut started = false;
        let mut done: Option<ExecutionStatus> = None;
        let mut last_error = None;
        let mut partitions_started = BTreeSet::new();

        for entry in &wal {
            match entry {
                WalEntry::JobStart { .. } => started = true,
                WalEntry::StepStart { .. } => {
                    started = true;
                    progress.steps_started += 1;
                }
                WalEntry::StepDone { .. } => progress.steps_finished += 1,
                WalEntry::PartitionStart {
                    step, partition, ..
                } => {
                    partitions_started.insert((step.clone(), *partition));
                }
                WalEntry::PartitionDone { status, .. } => {
                    progress.partitions_finished += 1;
                    if *status == ExecutionStatus::Failed {
                        progress.partitions_failed += 1;
                    }
                }
                WalEntry::ChunkBegin { .. } => progress.chunks_begun += 1,
                WalEntry::ChunkCommit { items, .. } => {
                    progress.chunks_committed += 1;
                    progress.items_written += items;
                }
                WalEntry::ChunkRollback { error, .. } => {
                    progress.chunks_rolled_back += 1;
                    last_error = Some(error.clone());
                }
                WalEntry::JobDone { status, .. } => done = Some(*status),
            }
        }
        progress.partitions_started = partitions_started.len();

        let status = done.or_else(|| {
            stored
                .as_ref()
                .map(|j| j.status)
                .filter(|s| s.is_terminal())
        });
        let stage = match status {
            Some(ExecutionStatus::Completed) => ProgressStage::Done,
            Some(ExecutionStatus::Failed) => ProgressStage::Failed,
            _ if started || stored.is_some() => ProgressStage::Running,
            _ => ProgressStage::Idle,
        };

        if let Some(job) = &stored
            && job.status == ExecutionStatus::Failed
        {
            last_error = job
                .error
                .clone()
                .or_else(|| job.failures().first().map(|f| f.error.clone()))
                .or(last_error);
        }

        Ok(ProgressStatus {
            run_id: run_id.to_string(),
            stage,
            progress,
            last_error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::sled_store::SledJobRepository;
    use model::{core::identifiers::PartitionId, pagination::key_range::KeyRange};
    use tempfile::tempdir;

    const RUN_ID: &str = "test-run";

    fn service() -> (tempfile::TempDir, Arc<dyn JobRepository>, ProgressService) {
        let dir = tempdir().unwrap();
        let repo: Arc<dyn JobRepository> =
            Arc::new(SledJobRepository::open(dir.path()).expect("open sled"));
        let service = ProgressService::new(repo.clone());
        (dir, repo, service)
    }

    #[tokio::test]
    async fn unknown_run_is_idle() {
        let (_dir, _repo, service) = service();
        let status = service.job_status(RUN_ID).await.unwrap();
        assert_eq!(status.stage, ProgressStage::Idle);
        assert_eq!(status.progress, JobProgress::default());
    }

    #[tokio::test]
    async fn counts_chunks_and_partitions_while_running() {
        let (_dir, repo, service) = service();
        let step = "refresh".to_string();

        repo.append_wal(&WalEntry::JobStart {
            run_id: RUN_ID.into(),
            job: "job".into(),
        })
        .await
        .unwrap();
        for p in 0..2 {
            repo.append_wal(&WalEntry::PartitionStart {
                run_id: RUN_ID.into(),
                step: step.clone(),
                partition: PartitionId(p),
                range: KeyRange::new(1, 10),
            })
            .await
            .unwrap();
        }
        repo.append_wal(&WalEntry::ChunkBegin {
            run_id: RUN_ID.into(),
            step: step.clone(),
            chunk_id: "c0".into(),
            seq: 0,
        })
        .await
        .unwrap();
        repo.append_wal(&WalEntry::ChunkCommit {
            run_id: RUN_ID.into(),
            step: step.clone(),
            chunk_id: "c0".into(),
            seq: 0,
            items: 10,
        })
        .await
        .unwrap();
        repo.append_wal(&WalEntry::PartitionDone {
            run_id: RUN_ID.into(),
            step: step.clone(),
            partition: PartitionId(0),
            status: ExecutionStatus::Completed,
        })
        .await
        .unwrap();

        let status = service.job_status(RUN_ID).await.unwrap();
        assert_eq!(status.stage, ProgressStage::Running);
        assert_eq!(status.progress.chunks_committed, 1);
        assert_eq!(status.progress.items_written, 10);
        assert_eq!(status.progress.partitions_started, 2);
        assert_eq!(status.progress.partitions_finished, 1);
    }

    #[tokio::test]
    async fn reports_failed_stage_with_rollback_error() {
        let (_dir, repo, service) = service();

        repo.append_wal(&WalEntry::ChunkRollback {
            run_id: RUN_ID.into(),
            step: "s".into(),
            chunk_id: "c3".into(),
            seq: 3,
            error: "sink down".into(),
        })
        .await
        .unwrap();
        repo.append_wal(&WalEntry::JobDone {
            run_id: RUN_ID.into(),
            status: ExecutionStatus::Failed,
        })
        .await
        .unwrap();

        let status = service.job_status(RUN_ID).await.unwrap();
        assert_eq!(status.stage, ProgressStage::Failed);
        assert_eq!(status.progress.chunks_rolled_back, 1);
        assert_eq!(status.last_error.as_deref(), Some("sink down"));
    }
}
