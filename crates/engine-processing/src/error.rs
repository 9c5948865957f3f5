use engine_core::error::{ProcessError, ReadError, WriteError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("WAL operation failed: {0}")]
    WalOperation(String),

    #[error("Checkpoint operation failed: {0}")]
    Checkpoint(String),
}

/// Why a chunk did not commit.
#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("Failed to read chunk {seq}: {source}")]
    Read {
        seq: u64,
        #[source]
        source: ReadError,
    },

    #[error("Failed to process chunk '{chunk_id}': {source}")]
    Process {
        chunk_id: String,
        #[source]
        source: ProcessError,
    },

    #[error("Failed to write chunk '{chunk_id}': {source}")]
    Write {
        chunk_id: String,
        #[source]
        source: WriteError,
    },

    #[error("Failed to record chunk '{chunk_id}': {source}")]
    State {
        chunk_id: String,
        #[source]
        source: StateError,
    },

    #[error("Reader of step '{0}' was consumed by an earlier execution")]
    ReaderConsumed(String),

    #[error("Chunk worker panicked: {0}")]
    Panicked(String),
}
