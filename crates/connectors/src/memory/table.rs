use async_trait::async_trait;
use engine_core::{connectors::source::PagedSource, error::ReadError};
use model::{
    core::keyed::Keyed,
    pagination::{key_range::KeyRange, page::PageQuery},
};
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};
use tokio::sync::{RwLock, Semaphore};
use tracing::debug;

/// An in-memory table keyed by `Keyed::key`, readable in ordered pages.
///
/// Clones share the same rows. Optional knobs emulate a real store: a
/// connection limit shared by all readers and a number of upcoming page
/// fetches that fail transiently.
#[derive(Clone)]
pub struct MemoryTable<T> {
    rows: Arc<RwLock<BTreeMap<i64, T>>>,
    connections: Option<Arc<Semaphore>>,
    failing_fetches: Arc<AtomicUsize>,
    fetches: Arc<AtomicU64>,
}

impl<T> Default for MemoryTable<T> {
    fn default() -> Self {
        Self {
            rows: Arc::new(RwLock::new(BTreeMap::new())),
            connections: None,
            failing_fetches: Arc::new(AtomicUsize::new(0)),
            fetches: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<T> MemoryTable<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: impl IntoIterator<Item = T>) -> Self {
        let rows = items.into_iter().map(|item| (item.key(), item)).collect();
        Self {
            rows: Arc::new(RwLock::new(rows)),
            ..Self::default()
        }
    }

    /// At most `limit` concurrent page fetches; further callers wait.
    pub fn with_connection_limit(mut self, limit: usize) -> Self {
        self.connections = Some(Arc::new(Semaphore::new(limit.max(1))));
        self
    }

    /// The next `n` page fetches fail with a transient error.
    pub fn fail_next_fetches(&self, n: usize) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Inserts or replaces rows by key.
    pub async fn upsert_all(&self, items: impl IntoIterator<Item = T>) {
        let mut rows = self.rows.write().await;
        for item in items {
            rows.insert(item.key(), item);
        }
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    pub async fn get(&self, key: i64) -> Option<T> {
        self.rows.read().await.get(&key).cloned()
    }

    /// All rows in key order.
    pub async fn snapshot(&self) -> Vec<T> {
        self.rows.read().await.values().cloned().collect()
    }

    pub async fn keys(&self) -> Vec<i64> {
        self.rows.read().await.keys().copied().collect()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_fetches
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<T> PagedSource<T> for MemoryTable<T>
where
    T: Keyed + Clone + Send + Sync + 'static,
{
    async fn key_bounds(&self) -> Result<Option<KeyRange>, ReadError> {
        let rows = self.rows.read().await;
        match (rows.first_key_value(), rows.last_key_value()) {
            (Some((min, _)), Some((max, _))) => Ok(Some(KeyRange::new(*min, *max))),
            _ => Ok(None),
        }
    }

    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<T>, ReadError> {
        if query.limit == 0 {
            return Err(ReadError::Invalid("page limit must be positive".into()));
        }

        let _conn = match &self.connections {
            Some(sem) => sem.clone().acquire_owned().await.ok(),
            None => None,
        };
        self.fetches.fetch_add(1, Ordering::Relaxed);

        if self.take_injected_failure() {
            return Err(ReadError::Transient("injected fetch failure".into()));
        }

        let lower = match (query.cursor.last_key(), query.range) {
            (Some(last), Some(range)) => last.checked_add(1).map(|k| k.max(range.min)),
            (Some(last), None) => last.checked_add(1),
            (None, Some(range)) => Some(range.min),
            (None, None) => Some(i64::MIN),
        };
        let Some(lower) = lower else {
            return Ok(Vec::new());
        };
        let upper = query.range.map(|r| r.max).unwrap_or(i64::MAX);
        if lower > upper {
            return Ok(Vec::new());
        }

        let rows = self.rows.read().await;
        let page: Vec<T> = rows
            .range(lower..=upper)
            .map(|(_, item)| item)
            .filter(|item| query.matches(item.key(), item.updated_at()))
            .take(query.limit)
            .cloned()
            .collect();

        debug!(
            lower,
            upper,
            limit = query.limit,
            rows = page.len(),
            "Fetched page"
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use model::{pagination::cursor::Cursor, records::user::User};

    #[tokio::test]
    async fn bounds_of_empty_table_are_none() {
        let table: MemoryTable<i64> = MemoryTable::new();
        assert_eq!(table.key_bounds().await.unwrap(), None);

        table.upsert_all([7, 3, 11]).await;
        assert_eq!(
            table.key_bounds().await.unwrap(),
            Some(KeyRange::new(3, 11))
        );
    }

    #[tokio::test]
    async fn pages_are_ordered_without_gaps_or_duplicates() {
        let table = MemoryTable::from_items((1..=25i64).rev());
        let mut cursor = Cursor::None;
        let mut seen = Vec::new();

        loop {
            let page = table
                .fetch_page(&PageQuery::first(10).with_cursor(cursor))
                .await
                .unwrap();
            if page.is_empty() {
                break;
            }
            cursor = Cursor::after(*page.last().unwrap());
            seen.extend(page);
        }

        assert_eq!(seen, (1..=25).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn range_and_stale_filters_apply() {
        let now = Utc::now();
        let table = MemoryTable::from_items((1..=10).map(|id| {
            let age = if id % 2 == 0 { 3 } else { 0 };
            User::new(id, format!("user{id}"), 30, now - Duration::days(age))
        }));

        let page = table
            .fetch_page(
                &PageQuery::first(100)
                    .with_range(Some(KeyRange::new(3, 8)))
                    .with_updated_before(Some(now - Duration::days(1))),
            )
            .await
            .unwrap();

        let ids: Vec<i64> = page.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![4, 6, 8]);
    }

    #[tokio::test]
    async fn injected_failures_are_transient_and_counted() {
        let table = MemoryTable::from_items(1..=3i64);
        table.fail_next_fetches(1);

        let err = table.fetch_page(&PageQuery::first(5)).await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(table.fetch_page(&PageQuery::first(5)).await.unwrap().len(), 3);
        assert_eq!(table.fetch_count(), 2);
    }

    #[tokio::test]
    async fn cursor_at_max_key_yields_nothing() {
        let table = MemoryTable::from_items([i64::MAX]);
        let page = table
            .fetch_page(&PageQuery::first(5).with_cursor(Cursor::after(i64::MAX)))
            .await
            .unwrap();
        assert!(page.is_empty());
    }
}
