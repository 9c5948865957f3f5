use crate::{
    error::StateStoreError,
    state::{
        JobRepository,
        models::{Checkpoint, WalEntry},
    },
};
use async_trait::async_trait;
use model::execution::job::JobExecution;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, JobExecution>,
    checkpoints: HashMap<(String, String), Checkpoint>,
    wal: HashMap<String, Vec<WalEntry>>,
}

/// Process-local repository; nothing survives a restart.
#[derive(Default)]
pub struct InMemoryJobRepository {
    inner: RwLock<Inner>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn save_job(&self, job: &JobExecution) -> Result<(), StateStoreError> {
        self.inner
            .write()
            .await
            .jobs
            .insert(job.run_id.clone(), job.clone());
        Ok(())
    }

    async fn load_job(&self, run_id: &str) -> Result<Option<JobExecution>, StateStoreError> {
        Ok(self.inner.read().await.jobs.get(run_id).cloned())
    }

    async fn list_jobs(&self) -> Result<Vec<JobExecution>, StateStoreError> {
        let mut jobs: Vec<_> = self.inner.read().await.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.started_at);
        Ok(jobs)
    }

    async fn save_checkpoint(&self, cp: &Checkpoint) -> Result<(), StateStoreError> {
        let mut inner = self.inner.write().await;
        let key = (cp.run_id.clone(), cp.step.clone());
        if let Some(existing) = inner.checkpoints.get(&key)
            && !cp.supersedes(existing)
        {
            return Ok(());
        }
        inner.checkpoints.insert(key, cp.clone());
        Ok(())
    }

    async fn load_checkpoint(
        &self,
        run_id: &str,
        step: &str,
    ) -> Result<Option<Checkpoint>, StateStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .checkpoints
            .get(&(run_id.to_string(), step.to_string()))
            .cloned())
    }

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), StateStoreError> {
        self.inner
            .write()
            .await
            .wal
            .entry(entry.run_id().to_string())
            .or_default()
            .push(entry.clone());
        Ok(())
    }

    async fn iter_wal(&self, run_id: &str) -> Result<Vec<WalEntry>, StateStoreError> {
        Ok(self
            .inner
            .read()
            .await
            .wal
            .get(run_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::models::CheckpointStage;

    #[tokio::test]
    async fn checkpoint_never_moves_backwards() {
        let repo = InMemoryJobRepository::new();
        let mk = |seq: u64, stage| Checkpoint {
            run_id: "r".into(),
            step: "s".into(),
            partition: None,
            stage,
            chunk_id: format!("c{seq}"),
            chunk_seq: seq,
            items_done: 0,
            updated_at: chrono::Utc::now(),
        };

        repo.save_checkpoint(&mk(4, CheckpointStage::Committed))
            .await
            .unwrap();
        repo.save_checkpoint(&mk(2, CheckpointStage::Committed))
            .await
            .unwrap();
        repo.save_checkpoint(&mk(4, CheckpointStage::Begun))
            .await
            .unwrap();

        let cp = repo.load_checkpoint("r", "s").await.unwrap().unwrap();
        assert_eq!(cp.chunk_seq, 4);
        assert_eq!(cp.stage, CheckpointStage::Committed);
    }
}
