//! Recency-filtered replay of a slice's recent history.
//!
//! Backfill streams everything a lagging replica needs to catch a key range
//! up from a point in time: range-erase markers, single-key deletion
//! entries, and live pairs, all filtered to recencies at or after
//! `since_when`.

use moraine_types::{KeyRange, Recency, StoreKey};
use tokio_util::sync::CancellationToken;

use crate::blob::LeafValue;
use crate::error::StoreError;
use crate::slice::{Superblock, Transaction};
use crate::LEAF_SPAN;

/// Receiver of backfill events. Every call carries the interruptor so slow
/// consumers can stop the stream between events.
pub trait AgnosticBackfillCallback {
    fn on_delete_range(
        &mut self,
        range: &KeyRange,
        interruptor: &CancellationToken,
    ) -> Result<(), StoreError>;

    fn on_deletion(
        &mut self,
        key: &StoreKey,
        recency: Recency,
        interruptor: &CancellationToken,
    ) -> Result<(), StoreError>;

    fn on_pair(
        &mut self,
        txn: &Transaction,
        recency: Recency,
        key: &StoreKey,
        value: &LeafValue,
        interruptor: &CancellationToken,
    ) -> Result<(), StoreError>;
}

/// Streams the range's recent history into `callback`.
///
/// Erase markers intersecting the range come first, then entries in key
/// order. The interruptor is honored between leaves.
pub async fn agnostic_backfill(
    txn: &Transaction,
    superblock: Superblock,
    range: &KeyRange,
    since_when: Recency,
    callback: &mut dyn AgnosticBackfillCallback,
    interruptor: &CancellationToken,
) -> Result<(), StoreError> {
    let markers: Vec<KeyRange> = superblock
        .guard
        .erased
        .iter()
        .filter(|(_, recency)| *recency >= since_when)
        .filter_map(|(erased, _)| erased.intersect(range))
        .collect();
    let snapshot = superblock.guard.slots_in_range(range);
    drop(superblock);

    for marker in &markers {
        if interruptor.is_cancelled() {
            return Err(StoreError::Interrupted);
        }
        callback.on_delete_range(marker, interruptor)?;
    }

    for leaf in snapshot.chunks(LEAF_SPAN) {
        if interruptor.is_cancelled() {
            return Err(StoreError::Interrupted);
        }
        for (key, slot) in leaf {
            let (value, recency) = {
                let guard = slot.lock().await;
                (guard.value.clone(), guard.recency)
            };
            // Placeholder slots (never committed) have no recency.
            let Some(recency) = recency else {
                continue;
            };
            if recency < since_when {
                continue;
            }
            match &value {
                Some(value) => callback.on_pair(txn, recency, key, value, interruptor)?,
                None => callback.on_deletion(key, recency, interruptor)?,
            }
        }
    }

    Ok(())
}
