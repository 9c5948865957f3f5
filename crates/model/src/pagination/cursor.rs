use serde::{Deserialize, Serialize};

/// Represents the keyset pagination cursor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cursor {
    /// First page, nothing consumed yet.
    #[default]
    None,

    /// Cursor for a strictly increasing key: the next page starts after `key`.
    Pk { key: i64 },
}

impl Cursor {
    pub fn after(key: i64) -> Self {
        Cursor::Pk { key }
    }

    /// Last key consumed, if any.
    pub fn last_key(&self) -> Option<i64> {
        match self {
            Cursor::None => None,
            Cursor::Pk { key } => Some(*key),
        }
    }

    /// Whether an item with `key` lies beyond this cursor.
    pub fn admits(&self, key: i64) -> bool {
        match self {
            Cursor::None => true,
            Cursor::Pk { key: last } => key > *last,
        }
    }

    /// Returns the later of the two cursors.
    pub fn max(self, other: Cursor) -> Cursor {
        match (self.last_key(), other.last_key()) {
            (Some(a), Some(b)) if b > a => other,
            (None, Some(_)) => other,
            _ => self,
        }
    }
}
