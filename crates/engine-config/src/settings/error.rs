use thiserror::Error;

/// Errors raised while loading or validating batch settings. All of them are
/// reported before any work starts.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Chunk size must be a positive integer.
    #[error("Invalid chunk size: {0} (must be a positive integer)")]
    InvalidChunkSize(i64),

    /// Page size must be a positive integer.
    #[error("Invalid page size: {0} (must be a positive integer)")]
    InvalidPageSize(i64),

    /// Partition count must be a positive integer.
    #[error("Invalid partition count: {0} (must be a positive integer)")]
    InvalidPartitionCount(i64),

    /// A worker pool was sized with a non-positive number of slots.
    #[error("Invalid size for {pool} pool: {value} (must be a positive integer)")]
    InvalidPoolSize { pool: String, value: i64 },

    /// A duration setting was negative or zero where it must be positive.
    #[error("Invalid duration for {field}: {value}")]
    InvalidDuration { field: String, value: i64 },

    /// A step builder was finished without a required component.
    #[error("Step '{step}' is missing its {component}")]
    MissingComponent { step: String, component: String },

    #[error("Invalid retry settings: {0}")]
    InvalidRetry(String),

    /// Two settings contradict each other.
    #[error("Conflicting settings: {0}")]
    Conflict(String),

    /// More than one setting was invalid.
    #[error("Settings validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
}
