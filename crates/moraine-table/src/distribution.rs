//! The key-distribution estimator, for range planning.

use std::collections::BTreeMap;

use moraine_store::{key_distribution, Superblock};
use moraine_types::StoreKey;

use crate::error::TableError;
use crate::DISTRIBUTION_MIN_PER_BUCKET;

/// Approximate bucket boundaries with a per-bucket key estimate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionResponse {
    pub key_counts: BTreeMap<StoreKey, i64>,
}

/// Samples boundary keys down to `max_depth` tree levels.
///
/// The leftmost boundary is the caller's `left_key`, not the first stored
/// key, so adjacent shards tile without gaps. Every bucket reports the same
/// estimate: the total divided by the number of splits, floored at
/// [`DISTRIBUTION_MIN_PER_BUCKET`] — or the total itself when the tree is
/// shallow enough to have no splits.
pub async fn distribution(
    superblock: Superblock,
    max_depth: u32,
    left_key: StoreKey,
) -> Result<DistributionResponse, TableError> {
    let (key_count, splits) = key_distribution(superblock, max_depth).await?;

    let keys_per_bucket = if splits.is_empty() {
        key_count
    } else {
        (key_count / splits.len() as i64).max(DISTRIBUTION_MIN_PER_BUCKET)
    };

    let mut key_counts = BTreeMap::new();
    key_counts.insert(left_key, keys_per_bucket);
    for split in splits {
        key_counts.insert(split, keys_per_bucket);
    }

    Ok(DistributionResponse { key_counts })
}
