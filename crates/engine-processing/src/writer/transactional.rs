use async_trait::async_trait;
use engine_core::{
    connectors::{sink::ChunkSink, writer::ItemWriter},
    error::WriteError,
};
use model::records::chunk::Chunk;
use std::{sync::Arc, time::Instant};
use tracing::{info, warn};

/// Writes each chunk inside one sink transaction: begin, stage every item,
/// then commit. Any failure before the commit rolls the transaction back.
pub struct TransactionalWriter<T>
where
    T: Send + Sync + 'static,
{
    sink: Arc<dyn ChunkSink<T>>,
}

impl<T> TransactionalWriter<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(sink: Arc<dyn ChunkSink<T>>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl<T> ItemWriter<T> for TransactionalWriter<T>
where
    T: Send + Sync + 'static,
{
    async fn write(&self, chunk: &Chunk<T>) -> Result<(), WriteError> {
        let start = Instant::now();
        let mut tx = self.sink.begin(&chunk.id).await?;

        if let Err(err) = tx.write(&chunk.items).await {
            if let Err(rb) = tx.rollback().await {
                warn!(chunk_id = %chunk.id, error = %rb, "Rollback after failed write also failed");
            }
            return Err(err);
        }
        tx.commit().await?;

        info!(
            chunk_id = %chunk.id,
            items = chunk.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Chunk written"
        );
        Ok(())
    }
}
