//! Generic bulk deletion over a key interval.
//!
//! The interval is open on the left and closed on the right, matching the
//! traversal order of a deletion that walks up to (and including) a
//! boundary key. Callers with a half-open `[left, right)` range convert by
//! decrementing both bounds.

use moraine_types::{KeyRange, Recency, StoreKey};
use tokio_util::sync::CancellationToken;

use crate::blob::LeafValue;
use crate::error::StoreError;
use crate::slice::{Slice, Superblock, Transaction};
use crate::LEAF_SPAN;

/// Decides which keys in the interval are erased.
pub trait KeyTester {
    fn matches(&self, key: &StoreKey) -> bool;

    /// Whether this tester erases every key it is shown. When true, the
    /// erase is recorded as a single range marker for backfill; otherwise
    /// each erased key leaves its own deletion entry.
    fn erases_everything(&self) -> bool {
        false
    }
}

/// The tester that erases the whole interval.
pub struct AlwaysErase;

impl KeyTester for AlwaysErase {
    fn matches(&self, _key: &StoreKey) -> bool {
        true
    }

    fn erases_everything(&self) -> bool {
        true
    }
}

/// Releases whatever a value owns before its slot disappears.
pub trait ValueDeleter {
    fn delete_value(&self, txn: &Transaction, value: &mut LeafValue) -> Result<(), StoreError>;
}

/// Erases every key in `(left_exclusive, right_inclusive]` accepted by
/// `tester`. The superblock is held for the whole erase; the interruptor is
/// checked between leaves (already-erased leaves stay erased). Returns the
/// number of values deleted.
#[allow(clippy::too_many_arguments)]
pub async fn erase_range_generic(
    txn: &Transaction,
    slice: &Slice,
    mut superblock: Superblock,
    tester: &dyn KeyTester,
    deleter: &dyn ValueDeleter,
    left_exclusive: Option<&StoreKey>,
    right_inclusive: Option<&StoreKey>,
    recency: Recency,
    interruptor: &CancellationToken,
) -> Result<u64, StoreError> {
    // The equivalent half-open range, for the snapshot and the marker.
    let left = match left_exclusive {
        Some(k) => k.successor(),
        None => StoreKey::min(),
    };
    let right = right_inclusive.map(StoreKey::successor);
    let range = KeyRange::new(left, right);

    let snapshot = superblock.guard.slots_in_range(&range);

    let mut deleted = 0u64;
    for leaf in snapshot.chunks(LEAF_SPAN) {
        if interruptor.is_cancelled() {
            return Err(StoreError::Interrupted);
        }
        for (key, slot) in leaf {
            if !tester.matches(key) {
                continue;
            }
            let mut guard = slot.lock().await;
            if let Some(value) = guard.value.as_mut() {
                deleter.delete_value(txn, value)?;
                deleted += 1;
                slice.note_value_erased();
            }
            if tester.erases_everything() {
                guard.value = None;
                drop(guard);
                superblock.guard.slots.remove(key);
            } else {
                // Leave a deletion entry so backfill can replay this key.
                guard.value = None;
                guard.recency = Some(recency);
            }
        }
    }

    if tester.erases_everything() {
        superblock.guard.erased.push((range, recency));
    }

    tracing::debug!(deleted, "erased key range");
    Ok(deleted)
}
