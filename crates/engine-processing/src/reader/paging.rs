use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::{
    connectors::{reader::ItemReader, source::PagedSource},
    error::{ReadError, classify_read_error},
    retry::{RetryError, RetryPolicy},
};
use model::{
    core::keyed::Keyed,
    execution::partition::PartitionContext,
    pagination::{cursor::Cursor, key_range::KeyRange, page::PageQuery},
};
use std::{collections::VecDeque, num::NonZeroUsize, sync::Arc};
use tracing::debug;

/// Streams items from a [`PagedSource`] with keyset pagination.
///
/// Holds at most one page in memory. The page after key `k` starts strictly
/// after `k`, so pages never overlap nor skip keys. A short page marks the
/// end of the data.
pub struct PagingItemReader<T>
where
    T: Send + 'static,
{
    source: Arc<dyn PagedSource<T>>,
    page_size: NonZeroUsize,
    range: Option<KeyRange>,
    updated_before: Option<DateTime<Utc>>,
    retry: RetryPolicy,
    buffer: VecDeque<T>,
    cursor: Cursor,
    done: bool,
}

impl<T> PagingItemReader<T>
where
    T: Keyed + Send + 'static,
{
    pub fn new(source: Arc<dyn PagedSource<T>>, page_size: NonZeroUsize) -> Self {
        Self {
            source,
            page_size,
            range: None,
            updated_before: None,
            retry: RetryPolicy::none(),
            buffer: VecDeque::new(),
            cursor: Cursor::None,
            done: false,
        }
    }

    /// Reader scoped to the key range of one partition.
    pub fn for_partition(
        source: Arc<dyn PagedSource<T>>,
        page_size: NonZeroUsize,
        partition: &PartitionContext,
    ) -> Self {
        Self::new(source, page_size).with_range(partition.range())
    }

    pub fn with_range(mut self, range: KeyRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Only records last updated strictly before `threshold` are read.
    pub fn with_updated_before(mut self, threshold: Option<DateTime<Utc>>) -> Self {
        self.updated_before = threshold;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    async fn fetch_next_page(&mut self) -> Result<(), ReadError> {
        let query = PageQuery::first(self.page_size.get())
            .with_range(self.range)
            .with_cursor(self.cursor)
            .with_updated_before(self.updated_before);

        let source = self.source.clone();
        let page = self
            .retry
            .run(
                "fetch_page",
                || {
                    let source = source.clone();
                    let query = query.clone();
                    async move { source.fetch_page(&query).await }
                },
                classify_read_error,
            )
            .await
            .map_err(|err| match err {
                RetryError::Fatal(e) => e,
                RetryError::AttemptsExceeded { attempts, last } => ReadError::AttemptsExceeded {
                    attempts,
                    last: last.to_string(),
                },
            })?;

        debug!(
            cursor = ?self.cursor,
            range = ?self.range,
            rows = page.len(),
            "Fetched page"
        );

        if page.len() < self.page_size.get() {
            self.done = true;
        }
        if let Some(last) = page.last() {
            let last_key = last.key();
            if !self.cursor.admits(last_key) {
                return Err(ReadError::Invalid(format!(
                    "source returned key {last_key} at or before cursor {:?}",
                    self.cursor
                )));
            }
            self.cursor = Cursor::after(last_key);
        }
        self.buffer.extend(page);
        Ok(())
    }
}

#[async_trait]
impl<T> ItemReader<T> for PagingItemReader<T>
where
    T: Keyed + Send + 'static,
{
    async fn read(&mut self) -> Result<Option<T>, ReadError> {
        if self.buffer.is_empty() && !self.done {
            self.fetch_next_page().await?;
        }
        Ok(self.buffer.pop_front())
    }
}
