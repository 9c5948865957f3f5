use crate::error::ReadError;
use async_trait::async_trait;

/// Pulls items one at a time from an underlying source.
///
/// `Ok(None)` is the exhaustion sentinel, not an error. Once a reader has
/// returned `None` it keeps returning `None`.
#[async_trait]
pub trait ItemReader<T>: Send
where
    T: Send + 'static,
{
    async fn read(&mut self) -> Result<Option<T>, ReadError>;
}

