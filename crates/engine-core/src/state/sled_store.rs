use crate::{
    error::StateStoreError,
    state::{
        JobRepository,
        models::{Checkpoint, WalEntry},
    },
};
use async_trait::async_trait;
use model::execution::job::JobExecution;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;

/// Job repository backed by an embedded sled database, values encoded with
/// bincode.
pub struct SledJobRepository {
    db: sled::Db,
}

impl SledJobRepository {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StateStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    #[inline]
    fn job_key(run_id: &str) -> String {
        format!("job:{run_id}")
    }

    #[inline]
    fn chk_key(run_id: &str, step: &str) -> String {
        format!("chk:{run_id}:{step}")
    }

    #[inline]
    fn wal_prefix(run_id: &str) -> String {
        format!("wal:{run_id}:")
    }
}

#[async_trait]
impl JobRepository for SledJobRepository {
    async fn save_job(&self, job: &JobExecution) -> Result<(), StateStoreError> {
        let bytes = bincode::serialize(job)?;
        self.db
            .insert(Self::job_key(&job.run_id), bytes)
            .map_err(|e| StateStoreError::SaveJob(e.to_string()))?;
        self.db
            .flush_async()
            .await
            .map_err(|e| StateStoreError::SaveJob(e.to_string()))?;
        Ok(())
    }

    async fn load_job(&self, run_id: &str) -> Result<Option<JobExecution>, StateStoreError> {
        match self
            .db
            .get(Self::job_key(run_id))
            .map_err(|e| StateStoreError::LoadJob(e.to_string()))?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list_jobs(&self) -> Result<Vec<JobExecution>, StateStoreError> {
        let mut jobs = Vec::new();
        for item in self.db.scan_prefix("job:") {
            let (_key, value) = item.map_err(|e| StateStoreError::LoadJob(e.to_string()))?;
            jobs.push(bincode::deserialize::<JobExecution>(&value)?);
        }
        jobs.sort_by_key(|j| j.started_at);
        Ok(jobs)
    }

    async fn save_checkpoint(&self, cp: &Checkpoint) -> Result<(), StateStoreError> {
        let key = Self::chk_key(&cp.run_id, &cp.step);
        let new_bytes = bincode::serialize(cp)?;

        // Check-then-set must be atomic: concurrent chunk workers of the same
        // step race on this key.
        let result = self.db.transaction::<_, _, bincode::Error>(|tx_db| {
            if let Some(existing_bytes) = tx_db.get(&key)? {
                let existing: Checkpoint = bincode::deserialize(&existing_bytes)
                    .map_err(ConflictableTransactionError::Abort)?;
                if !cp.supersedes(&existing) {
                    return Ok(());
                }
            }
            tx_db.insert(key.as_bytes(), new_bytes.as_slice())?;
            Ok(())
        });

        match result {
            Ok(()) => Ok(()),
            Err(TransactionError::Abort(e)) => Err(StateStoreError::SaveCheckpoint(e.to_string())),
            Err(TransactionError::Storage(e)) => {
                Err(StateStoreError::SaveCheckpoint(e.to_string()))
            }
        }
    }

    async fn load_checkpoint(
        &self,
        run_id: &str,
        step: &str,
    ) -> Result<Option<Checkpoint>, StateStoreError> {
        match self
            .db
            .get(Self::chk_key(run_id, step))
            .map_err(|e| StateStoreError::LoadCheckpoint(e.to_string()))?
        {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn append_wal(&self, entry: &WalEntry) -> Result<(), StateStoreError> {
        // sled ids are monotonic; big-endian keeps scan order equal to append order.
        let seq = self
            .db
            .generate_id()
            .map_err(|e| StateStoreError::AppendWal(e.to_string()))?;
        let mut key = Self::wal_prefix(entry.run_id()).into_bytes();
        key.extend_from_slice(&seq.to_be_bytes());
        let value = bincode::serialize(entry)?;

        self.db
            .insert(key, value)
            .map_err(|e| StateStoreError::AppendWal(e.to_string()))?;
        Ok(())
    }

    async fn iter_wal(&self, run_id: &str) -> Result<Vec<WalEntry>, StateStoreError> {
        let mut entries = Vec::new();
        for item in self.db.scan_prefix(Self::wal_prefix(run_id)) {
            let (_key, value) = item.map_err(|e| StateStoreError::IterateWal(e.to_string()))?;
            entries.push(bincode::deserialize(&value)?);
        }
        Ok(entries)
    }
}
