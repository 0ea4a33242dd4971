//! Key-ordered traversal over a slice's live pairs.

use moraine_types::{KeyRange, StoreKey};
use tokio_util::sync::CancellationToken;

use crate::blob::LeafValue;
use crate::error::StoreError;
use crate::slice::Superblock;
use crate::LEAF_SPAN;

/// Walks the live pairs of `range` in key order, calling `on_pair` for each.
///
/// The pair snapshot is taken under the superblock, which is then released;
/// values are read slot-by-slot as the walk reaches them. Pairs are grouped
/// into leaves of [`LEAF_SPAN`]; the interruptor is checked between leaves.
///
/// Returns `Ok(true)` if the whole range was walked, `Ok(false)` if the
/// callback stopped the walk, and `Err(Interrupted)` on cancellation.
pub async fn depth_first_traversal<F>(
    superblock: Superblock,
    range: &KeyRange,
    interruptor: &CancellationToken,
    mut on_pair: F,
) -> Result<bool, StoreError>
where
    F: FnMut(&StoreKey, &LeafValue) -> bool,
{
    let snapshot = superblock.guard.slots_in_range(range);
    drop(superblock);

    for leaf in snapshot.chunks(LEAF_SPAN) {
        if interruptor.is_cancelled() {
            return Err(StoreError::Interrupted);
        }
        for (key, slot) in leaf {
            let value = {
                let guard = slot.lock().await;
                guard.value.clone()
            };
            let Some(value) = value else {
                continue;
            };
            if !on_pair(key, &value) {
                return Ok(false);
            }
        }
    }

    Ok(true)
}
