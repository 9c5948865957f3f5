use crate::error::PartitionError;
use async_trait::async_trait;
use engine_core::connectors::source::PagedSource;
use model::pagination::key_range::KeyRange;
use std::sync::Arc;

/// Live lookup of the partitioning key's minimum and maximum.
#[async_trait]
pub trait KeyBounds: Send + Sync {
    /// `None` when the dataset is empty.
    async fn key_bounds(&self) -> Result<Option<KeyRange>, PartitionError>;
}

/// Key domain of a partitioned step.
#[derive(Clone)]
pub enum PartitionBounds {
    /// Known up front; `min > max` is rejected when the step starts.
    Fixed(KeyRange),
    /// Queried when the step starts; rows inserted afterwards are not seen.
    Query(Arc<dyn KeyBounds>),
}

impl PartitionBounds {
    pub fn fixed(min: i64, max: i64) -> Self {
        PartitionBounds::Fixed(KeyRange::new(min, max))
    }

    pub fn from_source<T>(source: Arc<dyn PagedSource<T>>) -> Self
    where
        T: Send + 'static,
    {
        PartitionBounds::Query(Arc::new(SourceBounds { source }))
    }

    pub async fn resolve(&self) -> Result<Option<KeyRange>, PartitionError> {
        match self {
            PartitionBounds::Fixed(range) if range.is_empty() => Err(PartitionError::InvertedRange {
                min: range.min,
                max: range.max,
            }),
            PartitionBounds::Fixed(range) => Ok(Some(*range)),
            PartitionBounds::Query(bounds) => bounds.key_bounds().await,
        }
    }
}

struct SourceBounds<T>
where
    T: Send + 'static,
{
    source: Arc<dyn PagedSource<T>>,
}

#[async_trait]
impl<T> KeyBounds for SourceBounds<T>
where
    T: Send + 'static,
{
    async fn key_bounds(&self) -> Result<Option<KeyRange>, PartitionError> {
        self.source
            .key_bounds()
            .await
            .map_err(|e| PartitionError::Bounds(Box::new(e)))
    }
}
