//! Range erase over document values.

use moraine_store::{
    erase_range_generic, KeyTester, LeafValue, Slice, StoreError, Superblock, Transaction,
    ValueDeleter,
};
use moraine_types::{KeyRange, Recency};
use tokio_util::sync::CancellationToken;

use crate::error::TableError;

/// Releases a document value's extents before its slot disappears.
pub struct DocumentDeleter;

impl ValueDeleter for DocumentDeleter {
    fn delete_value(&self, txn: &Transaction, value: &mut LeafValue) -> Result<(), StoreError> {
        value.blob().clear(txn)
    }
}

/// Erases every key of `range` accepted by `tester`.
///
/// The half-open `[left, right)` range converts to the engine's open-left,
/// closed-right interval by decrementing both bounds: a left bound with no
/// predecessor means "unbounded on the left", and a right bound with no
/// predecessor means the range holds nothing.
pub async fn erase_range(
    txn: &Transaction,
    slice: &Slice,
    superblock: Superblock,
    tester: &dyn KeyTester,
    range: &KeyRange,
    recency: Recency,
    interruptor: &CancellationToken,
) -> Result<u64, TableError> {
    let left_exclusive = range.left.decrement();

    let right_inclusive = match &range.right {
        None => None,
        Some(right) => match right.decrement() {
            Some(key) => Some(key),
            // The exclusive right bound is the minimum key: nothing to do.
            None => return Ok(0),
        },
    };

    let deleted = erase_range_generic(
        txn,
        slice,
        superblock,
        tester,
        &DocumentDeleter,
        left_exclusive.as_ref(),
        right_inclusive.as_ref(),
        recency,
        interruptor,
    )
    .await?;

    Ok(deleted)
}
