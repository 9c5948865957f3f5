use crate::core::keyed::Keyed;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user row, the canonical record of the stale-refresh workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub age: u32,
    pub last_updated: DateTime<Utc>,
}

impl User {
    pub fn new(id: i64, username: impl Into<String>, age: u32, last_updated: DateTime<Utc>) -> Self {
        Self {
            id,
            username: username.into(),
            age,
            last_updated,
        }
    }

    /// Copy of this user marked as refreshed at `now`.
    pub fn refreshed(&self, now: DateTime<Utc>) -> Self {
        Self {
            last_updated: now,
            ..self.clone()
        }
    }
}

impl Keyed for User {
    fn key(&self) -> i64 {
        self.id
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        Some(self.last_updated)
    }
}
