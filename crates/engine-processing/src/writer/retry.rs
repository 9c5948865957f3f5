use async_trait::async_trait;
use engine_core::{
    connectors::writer::ItemWriter,
    error::{WriteError, classify_write_error},
    retry::{RetryError, RetryPolicy},
};
use model::records::chunk::Chunk;
use std::sync::Arc;

/// Retries transient write failures of the wrapped writer.
///
/// Each attempt is a full, independent write of the chunk, so the wrapped
/// writer must discard the effects of a failed attempt (as
/// [`TransactionalWriter`](super::transactional::TransactionalWriter) does).
pub struct RetryingWriter<T>
where
    T: Send + Sync + 'static,
{
    inner: Arc<dyn ItemWriter<T>>,
    retry: RetryPolicy,
}

impl<T> RetryingWriter<T>
where
    T: Send + Sync + 'static,
{
    pub fn new(inner: Arc<dyn ItemWriter<T>>, retry: RetryPolicy) -> Self {
        Self { inner, retry }
    }
}

#[async_trait]
impl<T> ItemWriter<T> for RetryingWriter<T>
where
    T: Send + Sync + 'static,
{
    async fn write(&self, chunk: &Chunk<T>) -> Result<(), WriteError> {
        self.retry
            .run(
                "write_chunk",
                || self.inner.write(chunk),
                classify_write_error,
            )
            .await
            .map_err(|err| match err {
                RetryError::Fatal(e) => e,
                RetryError::AttemptsExceeded { attempts, last } => WriteError::AttemptsExceeded {
                    attempts,
                    last: last.to_string(),
                },
            })
    }
}
