use async_trait::async_trait;
use engine_core::{connectors::writer::ItemWriter, error::WriteError};
use model::records::chunk::Chunk;
use std::fmt::Debug;
use tracing::info;

/// Logs every item of a chunk; handy as the writer of demo and smoke steps.
#[derive(Debug, Clone, Default)]
pub struct LoggingWriter {
    label: String,
}

impl LoggingWriter {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

#[async_trait]
impl<T> ItemWriter<T> for LoggingWriter
where
    T: Debug + Send + Sync + 'static,
{
    async fn write(&self, chunk: &Chunk<T>) -> Result<(), WriteError> {
        let thread = std::thread::current();
        let thread_name = thread.name().unwrap_or("unnamed");
        for item in chunk {
            info!(
                writer = %self.label,
                chunk_id = %chunk.id,
                thread = thread_name,
                item = ?item,
                "Writing item"
            );
        }
        Ok(())
    }
}
