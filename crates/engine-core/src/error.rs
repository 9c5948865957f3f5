use crate::retry::RetryDisposition;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Transient read failure: {0}")]
    Transient(String),

    #[error("Data source error: {0}")]
    Source(#[source] BoxError),

    #[error("Read failed after {attempts} attempts: {last}")]
    AttemptsExceeded { attempts: usize, last: String },

    #[error("Invalid read request: {0}")]
    Invalid(String),
}

impl ReadError {
    pub fn is_transient(&self) -> bool {
        matches!(self, ReadError::Transient(_))
    }
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Item rejected: {0}")]
    Rejected(String),

    #[error("Processor failed: {0}")]
    Failed(#[source] BoxError),
}

#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Transient write failure: {0}")]
    Transient(String),

    #[error("Sink rejected chunk {chunk_id}: {reason}")]
    Rejected { chunk_id: String, reason: String },

    #[error("Failed to commit chunk {chunk_id}: {reason}")]
    Commit { chunk_id: String, reason: String },

    #[error("Failed to roll back chunk {chunk_id}: {reason}")]
    Rollback { chunk_id: String, reason: String },

    #[error("Write failed after {attempts} attempts: {last}")]
    AttemptsExceeded { attempts: usize, last: String },

    #[error("Sink error: {0}")]
    Sink(#[source] BoxError),
}

impl WriteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, WriteError::Transient(_))
    }
}

#[derive(Error, Debug)]
pub enum TaskletError {
    #[error("Tasklet failed: {0}")]
    Failed(String),

    #[error("Tasklet I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("Failed to save checkpoint: {0}")]
    SaveCheckpoint(String),

    #[error("Failed to load checkpoint: {0}")]
    LoadCheckpoint(String),

    #[error("Failed to append WAL entry: {0}")]
    AppendWal(String),

    #[error("Failed to iterate WAL entries: {0}")]
    IterateWal(String),

    #[error("Failed to save job execution: {0}")]
    SaveJob(String),

    #[error("Failed to load job execution: {0}")]
    LoadJob(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    #[error("Encoding error: {0}")]
    Codec(#[from] bincode::Error),
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Failed to read WAL: {0}")]
    Wal(String),

    #[error("Failed to load checkpoint: {0}")]
    LoadCheckpoint(String),

    #[error("Failed to load job execution: {0}")]
    LoadJob(String),
}

pub fn classify_read_error(err: &ReadError) -> RetryDisposition {
    if err.is_transient() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}

pub fn classify_write_error(err: &WriteError) -> RetryDisposition {
    if err.is_transient() {
        RetryDisposition::Retry
    } else {
        RetryDisposition::Stop
    }
}
