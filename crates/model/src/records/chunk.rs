use chrono::{DateTime, Utc};

/// A bounded group of items processed and committed as one unit.
///
/// `seq` is the position of the chunk within its step execution (0-based,
/// assigned in read order), `id` is a stable hash derived from run, step,
/// partition and `seq` so a replayed chunk lands on the same id.
#[derive(Debug, Clone)]
pub struct Chunk<T> {
    pub id: String,
    pub seq: u64,
    pub items: Vec<T>,
    pub ts: DateTime<Utc>,
}

impl<T> Chunk<T> {
    pub fn new(id: impl Into<String>, seq: u64, items: Vec<T>) -> Self {
        Self {
            id: id.into(),
            seq,
            items,
            ts: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

impl<'a, T> IntoIterator for &'a Chunk<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
