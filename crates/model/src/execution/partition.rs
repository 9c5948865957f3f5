use crate::{core::identifiers::PartitionId, pagination::key_range::KeyRange};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable description of one partition handed to a worker step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionContext {
    id: PartitionId,
    range: KeyRange,
}

impl PartitionContext {
    pub fn new(id: PartitionId, range: KeyRange) -> Self {
        Self { id, range }
    }

    pub fn id(&self) -> PartitionId {
        self.id
    }

    pub fn range(&self) -> KeyRange {
        self.range
    }

    pub fn min_key(&self) -> i64 {
        self.range.min
    }

    pub fn max_key(&self) -> i64 {
        self.range.max
    }
}

impl fmt::Display for PartitionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.range)
    }
}
