use crate::error::ReadError;
use async_trait::async_trait;
use model::pagination::{key_range::KeyRange, page::PageQuery};

/// A keyed data source that can be read in ordered pages.
///
/// Shared by every concurrent worker; implementations apply their own
/// admission limits (a worker waiting for a connection slot is expected).
#[async_trait]
pub trait PagedSource<T>: Send + Sync
where
    T: Send + 'static,
{
    /// Current min and max of the partitioning key, `None` for an empty source.
    async fn key_bounds(&self) -> Result<Option<KeyRange>, ReadError>;

    /// Items matching `query`, ascending by key, at most `query.limit` of them.
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<T>, ReadError>;
}
