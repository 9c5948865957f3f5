use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive, contiguous slice `[min, max]` of a key domain.
///
/// A range with `min > max` is empty. Sizes are computed in `i128` so the
/// full `i64` domain never overflows.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyRange {
    pub min: i64,
    pub max: i64,
}

impl KeyRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    /// Number of keys covered by the range.
    pub fn len(&self) -> u128 {
        if self.is_empty() {
            0
        } else {
            (self.max as i128 - self.min as i128 + 1) as u128
        }
    }

    pub fn contains(&self, key: i64) -> bool {
        key >= self.min && key <= self.max
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
