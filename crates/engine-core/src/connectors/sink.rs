use crate::error::WriteError;
use async_trait::async_trait;

/// A destination that can stage a chunk and then apply it atomically.
#[async_trait]
pub trait ChunkSink<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Opens a unit of work for `chunk_id`. Nothing staged in it is visible
    /// until `commit` succeeds.
    async fn begin(&self, chunk_id: &str) -> Result<Box<dyn SinkTransaction<T>>, WriteError>;
}

#[async_trait]
pub trait SinkTransaction<T>: Send
where
    T: Send + Sync + 'static,
{
    async fn write(&mut self, items: &[T]) -> Result<(), WriteError>;

    async fn commit(self: Box<Self>) -> Result<(), WriteError>;

    async fn rollback(self: Box<Self>) -> Result<(), WriteError>;
}
