use crate::error::WriteError;
use async_trait::async_trait;
use model::records::chunk::Chunk;
use std::sync::Arc;

/// Persists a whole chunk as one atomic unit: either every item is applied or
/// none is, and a returned error means none was.
#[async_trait]
pub trait ItemWriter<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    async fn write(&self, chunk: &Chunk<T>) -> Result<(), WriteError>;
}

#[async_trait]
impl<T, W> ItemWriter<T> for Arc<W>
where
    T: Send + Sync + 'static,
    W: ItemWriter<T> + ?Sized,
{
    async fn write(&self, chunk: &Chunk<T>) -> Result<(), WriteError> {
        (**self).write(chunk).await
    }
}
