use engine_config::settings::error::SettingsError;
use engine_core::error::{ProgressError, StateStoreError};
use engine_runtime::error::{EngineError, PartitionError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to load settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Failed to run the job: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid partitioning request: {0}")]
    Partition(#[from] PartitionError),

    #[error("Failed to open the job repository at {path}: {source}")]
    Repository {
        path: String,
        #[source]
        source: StateStoreError,
    },

    #[error("Failed to load progress: {0}")]
    Progress(#[from] ProgressError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}
