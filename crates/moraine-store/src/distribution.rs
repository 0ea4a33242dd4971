//! Approximate key-distribution sampling.

use moraine_types::{KeyRange, StoreKey};

use crate::error::StoreError;
use crate::slice::Superblock;
use crate::LEAF_SPAN;

/// Fanout of the modelled internal nodes, for depth-bounded sampling.
const INTERNAL_FANOUT: u64 = 16;

/// Samples boundary keys as if descending `max_depth` levels of the tree.
///
/// Returns the live key count and the boundary keys (excluding the first):
/// descending one more level multiplies the number of visible subtrees by
/// the fanout, until leaves are reached and every key is visible.
pub async fn key_distribution(
    superblock: Superblock,
    max_depth: u32,
) -> Result<(i64, Vec<StoreKey>), StoreError> {
    let snapshot = superblock.guard.slots_in_range(&KeyRange::all());
    drop(superblock);

    let mut live_keys = Vec::new();
    for (key, slot) in snapshot {
        if slot.lock().await.value.is_some() {
            live_keys.push(key);
        }
    }

    let n = live_keys.len() as u64;
    let leaves = n.div_ceil(LEAF_SPAN as u64).max(1);
    let buckets = INTERNAL_FANOUT
        .checked_pow(max_depth)
        .unwrap_or(u64::MAX)
        .min(leaves);

    if n == 0 || buckets <= 1 {
        return Ok((n as i64, Vec::new()));
    }

    let stride = n.div_ceil(buckets) as usize;
    let splits = live_keys
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i > 0 && i % stride == 0)
        .map(|(_, key)| key)
        .collect();

    Ok((n as i64, splits))
}
