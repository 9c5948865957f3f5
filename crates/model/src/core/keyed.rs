use chrono::{DateTime, Utc};

/// An item that carries an ordered partitioning key.
///
/// Paging readers rely on the key for keyset pagination, and partitioned
/// steps scope each worker to a contiguous slice of the key domain.
pub trait Keyed {
    fn key(&self) -> i64;

    /// Last modification time, used by stale filters. Items without one are
    /// always eligible.
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

impl Keyed for i64 {
    fn key(&self) -> i64 {
        *self
    }
}
