use engine_config::settings::error::SettingsError;
use engine_core::error::{BoxError, StateStoreError};
use thiserror::Error;

/// Errors raised while splitting a key domain into partitions.
#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("Partition count must be positive, got {0}")]
    InvalidCount(usize),

    #[error("Partition bounds are inverted: min {min} > max {max}")]
    InvertedRange { min: i64, max: i64 },

    #[error("Failed to look up partition key bounds: {0}")]
    Bounds(#[source] BoxError),

    #[error("Failed to create worker step for {partition}: {source}")]
    Factory {
        partition: String,
        #[source]
        source: BoxError,
    },
}

/// Top-level errors of the batch engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    #[error("Job repository error: {0}")]
    Repository(#[from] StateStoreError),

    /// The task was cancelled or panicked.
    #[error("Task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Failed to build async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Job '{0}' has no steps")]
    EmptyJob(String),
}
