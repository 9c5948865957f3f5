use crate::pagination::{cursor::Cursor, key_range::KeyRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single page request against a paged data source.
///
/// Sources must return at most `limit` items, in ascending key order, with
/// keys strictly after `cursor` and inside `range` when one is given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageQuery {
    pub range: Option<KeyRange>,
    pub cursor: Cursor,
    pub limit: usize,
    /// Only records last updated strictly before this instant are eligible.
    pub updated_before: Option<DateTime<Utc>>,
}

impl PageQuery {
    pub fn first(limit: usize) -> Self {
        Self {
            range: None,
            cursor: Cursor::None,
            limit,
            updated_before: None,
        }
    }

    pub fn with_range(mut self, range: Option<KeyRange>) -> Self {
        self.range = range;
        self
    }

    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn with_updated_before(mut self, updated_before: Option<DateTime<Utc>>) -> Self {
        self.updated_before = updated_before;
        self
    }

    /// Whether a record with the given key and update time matches the query
    /// predicate (the limit is not considered).
    pub fn matches(&self, key: i64, updated_at: Option<DateTime<Utc>>) -> bool {
        if !self.cursor.admits(key) {
            return false;
        }
        if let Some(range) = &self.range
            && !range.contains(key)
        {
            return false;
        }
        match (self.updated_before, updated_at) {
            (Some(threshold), Some(ts)) => ts < threshold,
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn predicate_respects_cursor_and_range() {
        let q = PageQuery::first(10)
            .with_range(Some(KeyRange::new(5, 9)))
            .with_cursor(Cursor::after(6));

        assert!(!q.matches(4, None));
        assert!(!q.matches(6, None));
        assert!(q.matches(7, None));
        assert!(q.matches(9, None));
        assert!(!q.matches(10, None));
    }

    #[test]
    fn predicate_respects_stale_threshold() {
        let now = Utc::now();
        let q = PageQuery::first(10).with_updated_before(Some(now - Duration::days(1)));

        assert!(q.matches(1, Some(now - Duration::days(2))));
        assert!(!q.matches(1, Some(now)));
        assert!(q.matches(1, None));
    }
}
