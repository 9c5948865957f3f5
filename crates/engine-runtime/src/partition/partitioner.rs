use crate::error::PartitionError;
use model::{
    core::identifiers::PartitionId, execution::partition::PartitionContext,
    pagination::key_range::KeyRange,
};

/// Splits `[min, max]` into at most `count` contiguous, disjoint ranges.
///
/// Every range holds `ceil(len / count)` keys except the last, which ends at
/// `max` exactly. An empty domain (`min > max`) yields no partitions; a count
/// larger than the domain yields one single-key partition per key.
/// Boundaries are computed in `i128`, so the full `i64` domain is safe.
pub fn compute_partitions(
    min: i64,
    max: i64,
    count: usize,
) -> Result<Vec<PartitionContext>, PartitionError> {
    if count == 0 {
        return Err(PartitionError::InvalidCount(count));
    }
    if min > max {
        return Ok(Vec::new());
    }

    let (lo, hi) = (min as i128, max as i128);
    let len = hi - lo + 1;
    let count = count as i128;
    let size = (len + count - 1) / count;

    let mut partitions = Vec::new();
    let mut start = lo;
    while start <= hi {
        let end = (start + size - 1).min(hi);
        partitions.push(PartitionContext::new(
            PartitionId(partitions.len()),
            KeyRange::new(start as i64, end as i64),
        ));
        start += size;
    }
    Ok(partitions)
}

/// [`compute_partitions`] over a [`KeyRange`].
pub fn partition_range(
    range: KeyRange,
    count: usize,
) -> Result<Vec<PartitionContext>, PartitionError> {
    compute_partitions(range.min, range.max, count)
}
