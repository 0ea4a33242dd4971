//! Unit tests for moraine-store.

use std::sync::Arc;

use moraine_types::{KeyRange, Recency, StoreKey};
use tokio_util::sync::CancellationToken;

use crate::{
    agnostic_backfill, apply_keyvalue_change, depth_first_traversal, erase_range_generic,
    find_keyvalue_location_for_read, find_keyvalue_location_for_write, key_distribution, ref_fits,
    superblock_handoff, AgnosticBackfillCallback, AlwaysErase, BlockStore, KeyTester, LeafValue,
    LeafValueSizer, Slice, StoreError, Transaction, ValueDeleter, BLOCK_SIZE, LEAF_SPAN,
    MAX_REF_LEN,
};

fn txn() -> Transaction {
    Transaction::new(Arc::new(BlockStore::new()))
}

/// Writes raw bytes at a key through the full cursor protocol.
async fn put(txn: &Transaction, slice: &Slice, key: &str, content: &[u8], recency: u64) {
    let superblock = slice.acquire_superblock().await;
    let key = StoreKey::from(key);
    let mut loc = find_keyvalue_location_for_write(txn, slice, superblock, &key, None).await;

    let mut value = LeafValue::new_zeroed();
    let mut blob = value.blob();
    blob.append_region(txn, content.len() as u64).unwrap();
    blob.write_at(txn, 0, content).unwrap();
    loc.set_value(value);
    apply_keyvalue_change(txn, &mut loc, Recency::new(recency))
        .await
        .unwrap();
}

async fn get(txn: &Transaction, slice: &Slice, key: &str) -> Option<Vec<u8>> {
    let superblock = slice.acquire_superblock().await;
    let key = StoreKey::from(key);
    let loc = find_keyvalue_location_for_read(txn, slice, superblock, &key).await;
    loc.value().map(|v| v.read_all(txn).unwrap())
}

async fn delete(txn: &Transaction, slice: &Slice, key: &str, recency: u64) {
    let superblock = slice.acquire_superblock().await;
    let key = StoreKey::from(key);
    let mut loc = find_keyvalue_location_for_write(txn, slice, superblock, &key, None).await;
    if let Some(value) = loc.value_mut() {
        value.blob().clear(txn).unwrap();
        loc.clear_value();
        apply_keyvalue_change(txn, &mut loc, Recency::new(recency))
            .await
            .unwrap();
    }
}

// ============================================================================
// Blob layer
// ============================================================================

#[test]
fn empty_value_is_an_empty_inline_blob() {
    let value = LeafValue::new_zeroed();
    assert_eq!(value.ref_area().len(), MAX_REF_LEN);
    assert_eq!(value.inline_size().unwrap(), 3);
    assert_eq!(value.value_size().unwrap(), 0);
}

#[test]
fn small_values_stay_inline() {
    let txn = txn();
    let mut value = LeafValue::new_zeroed();
    let content = b"hello blob";

    let mut blob = value.blob();
    blob.append_region(&txn, content.len() as u64).unwrap();
    blob.write_at(&txn, 0, content).unwrap();

    assert_eq!(txn.blocks().live_blocks(), 0);
    assert_eq!(value.read_all(&txn).unwrap(), content);
    assert_eq!(value.value_size().unwrap(), content.len() as u64);
    value.deep_check(&txn).unwrap();
}

#[test]
fn large_values_spill_to_extents_and_clear_releases_them() {
    let txn = txn();
    let mut value = LeafValue::new_zeroed();
    let content: Vec<u8> = (0..3 * BLOCK_SIZE + 17).map(|i| (i % 251) as u8).collect();

    let mut blob = value.blob();
    blob.append_region(&txn, content.len() as u64).unwrap();
    blob.write_at(&txn, 0, &content).unwrap();

    assert_eq!(txn.blocks().live_blocks(), 4);
    assert!(value.inline_size().unwrap() <= MAX_REF_LEN);
    assert_eq!(value.read_all(&txn).unwrap(), content);
    value.deep_check(&txn).unwrap();

    value.blob().clear(&txn).unwrap();
    assert_eq!(txn.blocks().live_blocks(), 0);
    assert_eq!(value.value_size().unwrap(), 0);
}

#[test]
fn very_large_values_use_one_indirection_level() {
    let txn = txn();
    let mut value = LeafValue::new_zeroed();
    // More data blocks than fit directly in the reference area.
    let content = vec![0xAB; 40 * BLOCK_SIZE];

    let mut blob = value.blob();
    blob.append_region(&txn, content.len() as u64).unwrap();
    blob.write_at(&txn, 0, &content).unwrap();

    // 40 data blocks plus one index block.
    assert_eq!(txn.blocks().live_blocks(), 41);
    assert!(value.inline_size().unwrap() <= MAX_REF_LEN);
    assert_eq!(value.read_all(&txn).unwrap(), content);
    value.deep_check(&txn).unwrap();

    value.blob().clear(&txn).unwrap();
    assert_eq!(txn.blocks().live_blocks(), 0);
}

#[test]
fn write_beyond_region_is_rejected() {
    let txn = txn();
    let mut value = LeafValue::new_zeroed();
    let mut blob = value.blob();
    blob.append_region(&txn, 4).unwrap();
    let err = blob.write_at(&txn, 2, b"xyz").unwrap_err();
    assert!(matches!(err, StoreError::WriteOutOfRegion { .. }));
}

#[test]
fn sizer_reports_reference_metrics() {
    let value = LeafValue::new_zeroed();
    assert_eq!(LeafValueSizer::size(&value).unwrap(), 3);
    assert!(LeafValueSizer::fits(&value, MAX_REF_LEN));
    assert!(LeafValueSizer::fits(&value, 3));
    assert!(!LeafValueSizer::fits(&value, 2));
    assert_eq!(LeafValueSizer::max_possible_size(), MAX_REF_LEN);
    assert_eq!(&LeafValueSizer::leaf_magic(), b"rdbl");
}

#[test]
fn garbage_reference_does_not_fit() {
    assert!(!ref_fits(&[0xFE, 0, 0], MAX_REF_LEN));
    assert!(!ref_fits(&[], MAX_REF_LEN));
}

// ============================================================================
// Cursor protocol
// ============================================================================

#[tokio::test]
async fn write_then_read_same_key() {
    let txn = txn();
    let slice = Slice::new();

    put(&txn, &slice, "k", b"v1", 1).await;
    assert_eq!(get(&txn, &slice, "k").await.unwrap(), b"v1");

    put(&txn, &slice, "k", b"v2", 2).await;
    assert_eq!(get(&txn, &slice, "k").await.unwrap(), b"v2");

    assert_eq!(
        slice.stats().keys_set.load(std::sync::atomic::Ordering::Relaxed),
        2
    );
}

#[tokio::test]
async fn read_of_missing_key_has_no_value() {
    let txn = txn();
    let slice = Slice::new();
    assert!(get(&txn, &slice, "nope").await.is_none());
}

#[tokio::test]
async fn delete_leaves_a_deletion_entry_invisible_to_reads() {
    let txn = txn();
    let slice = Slice::new();

    put(&txn, &slice, "k", b"v", 1).await;
    assert_eq!(slice.root_eviction_priority(), 1);

    delete(&txn, &slice, "k", 2).await;
    assert!(get(&txn, &slice, "k").await.is_none());
    assert_eq!(slice.root_eviction_priority(), 0);
}

#[tokio::test]
#[should_panic(expected = "dirty cursor")]
async fn dropping_a_dirty_cursor_panics() {
    let txn = txn();
    let slice = Slice::new();
    let superblock = slice.acquire_superblock().await;
    let key = StoreKey::from("k");
    let mut loc = find_keyvalue_location_for_write(&txn, &slice, superblock, &key, None).await;
    loc.set_value(LeafValue::new_zeroed());
    drop(loc);
}

#[tokio::test]
async fn superblock_handoff_passes_the_root_to_the_waiter() {
    let slice = Slice::new();
    let superblock = slice.acquire_superblock().await;
    let (sender, receiver) = superblock_handoff();

    sender.send(superblock);
    let superblock = receiver.wait().await.unwrap();
    drop(superblock);

    // Released cleanly: the next acquire goes through.
    let _ = slice.acquire_superblock().await;
}

#[tokio::test]
async fn abandoned_handoff_is_an_error() {
    let (sender, receiver) = superblock_handoff();
    drop(sender);
    assert!(matches!(
        receiver.wait().await,
        Err(StoreError::HandoffAbandoned)
    ));
}

#[tokio::test]
async fn write_cursor_releases_superblock_at_locate_time() {
    let txn = txn();
    let slice = Slice::new();
    let superblock = slice.acquire_superblock().await;
    let key = StoreKey::from("k");
    let mut loc = find_keyvalue_location_for_write(&txn, &slice, superblock, &key, None).await;

    // The cursor still holds the slot, but the root is free again.
    let superblock2 = slice.acquire_superblock().await;
    drop(superblock2);

    loc.set_value(LeafValue::new_zeroed());
    apply_keyvalue_change(&txn, &mut loc, Recency::new(1))
        .await
        .unwrap();
}

// ============================================================================
// Traversal
// ============================================================================

async fn populate(txn: &Transaction, slice: &Slice, n: usize) {
    for i in 0..n {
        put(txn, slice, &format!("key{i:03}"), format!("v{i}").as_bytes(), i as u64 + 1).await;
    }
}

#[tokio::test]
async fn traversal_visits_range_in_key_order() {
    let txn = txn();
    let slice = Slice::new();
    populate(&txn, &slice, 40).await;

    let range = KeyRange::new(StoreKey::from("key005"), Some(StoreKey::from("key015")));
    let mut seen = Vec::new();
    let superblock = slice.acquire_superblock().await;
    let completed = depth_first_traversal(superblock, &range, &CancellationToken::new(), |k, _| {
        seen.push(k.clone());
        true
    })
    .await
    .unwrap();

    assert!(completed);
    assert_eq!(seen.len(), 10);
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen[0], StoreKey::from("key005"));
    assert_eq!(seen[9], StoreKey::from("key014"));
}

#[tokio::test]
async fn traversal_stops_when_callback_declines() {
    let txn = txn();
    let slice = Slice::new();
    populate(&txn, &slice, 10).await;

    let mut seen = 0;
    let superblock = slice.acquire_superblock().await;
    let completed = depth_first_traversal(
        superblock,
        &KeyRange::all(),
        &CancellationToken::new(),
        |_, _| {
            seen += 1;
            seen < 3
        },
    )
    .await
    .unwrap();

    assert!(!completed);
    assert_eq!(seen, 3);
}

#[tokio::test]
async fn traversal_honors_cancellation() {
    let txn = txn();
    let slice = Slice::new();
    populate(&txn, &slice, 2 * LEAF_SPAN).await;

    let interruptor = CancellationToken::new();
    interruptor.cancel();

    let superblock = slice.acquire_superblock().await;
    let result =
        depth_first_traversal(superblock, &KeyRange::all(), &interruptor, |_, _| true).await;
    assert!(matches!(result, Err(StoreError::Interrupted)));
}

#[tokio::test]
async fn traversal_skips_deletion_entries() {
    let txn = txn();
    let slice = Slice::new();
    populate(&txn, &slice, 5).await;
    delete(&txn, &slice, "key002", 100).await;

    let mut seen = Vec::new();
    let superblock = slice.acquire_superblock().await;
    depth_first_traversal(superblock, &KeyRange::all(), &CancellationToken::new(), |k, _| {
        seen.push(k.clone());
        true
    })
    .await
    .unwrap();

    assert_eq!(seen.len(), 4);
    assert!(!seen.contains(&StoreKey::from("key002")));
}

// ============================================================================
// Erase range
// ============================================================================

struct BlobDeleter;

impl ValueDeleter for BlobDeleter {
    fn delete_value(&self, txn: &Transaction, value: &mut LeafValue) -> Result<(), StoreError> {
        value.blob().clear(txn)
    }
}

#[tokio::test]
async fn erase_is_open_left_closed_right() {
    let txn = txn();
    let slice = Slice::new();
    for key in ["a", "b", "c", "d"] {
        put(&txn, &slice, key, b"v", 1).await;
    }

    let superblock = slice.acquire_superblock().await;
    let deleted = erase_range_generic(
        &txn,
        &slice,
        superblock,
        &AlwaysErase,
        &BlobDeleter,
        Some(&StoreKey::from("a")),
        Some(&StoreKey::from("c")),
        Recency::new(9),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(deleted, 2);
    assert!(get(&txn, &slice, "a").await.is_some());
    assert!(get(&txn, &slice, "b").await.is_none());
    assert!(get(&txn, &slice, "c").await.is_none());
    assert!(get(&txn, &slice, "d").await.is_some());
}

#[tokio::test]
async fn unbounded_erase_clears_everything() {
    let txn = txn();
    let slice = Slice::new();
    populate(&txn, &slice, 10).await;

    let superblock = slice.acquire_superblock().await;
    let deleted = erase_range_generic(
        &txn,
        &slice,
        superblock,
        &AlwaysErase,
        &BlobDeleter,
        None,
        None,
        Recency::new(99),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(deleted, 10);
    assert_eq!(slice.root_eviction_priority(), 0);
    for i in 0..10 {
        assert!(get(&txn, &slice, &format!("key{i:03}")).await.is_none());
    }
}

struct EraseOdd;

impl KeyTester for EraseOdd {
    fn matches(&self, key: &StoreKey) -> bool {
        key.as_bytes().last().is_some_and(|b| (b - b'0') % 2 == 1)
    }
}

#[tokio::test]
async fn predicate_erase_leaves_deletion_entries() {
    let txn = txn();
    let slice = Slice::new();
    for key in ["k1", "k2", "k3"] {
        put(&txn, &slice, key, b"v", 1).await;
    }

    let superblock = slice.acquire_superblock().await;
    let deleted = erase_range_generic(
        &txn,
        &slice,
        superblock,
        &EraseOdd,
        &BlobDeleter,
        None,
        None,
        Recency::new(7),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(deleted, 2);
    assert!(get(&txn, &slice, "k1").await.is_none());
    assert!(get(&txn, &slice, "k2").await.is_some());
    assert!(get(&txn, &slice, "k3").await.is_none());
}

// ============================================================================
// Backfill
// ============================================================================

#[derive(Default)]
struct CollectingCallback {
    delete_ranges: Vec<KeyRange>,
    deletions: Vec<(StoreKey, Recency)>,
    pairs: Vec<(StoreKey, Recency, Vec<u8>)>,
}

impl AgnosticBackfillCallback for CollectingCallback {
    fn on_delete_range(
        &mut self,
        range: &KeyRange,
        _interruptor: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.delete_ranges.push(range.clone());
        Ok(())
    }

    fn on_deletion(
        &mut self,
        key: &StoreKey,
        recency: Recency,
        _interruptor: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.deletions.push((key.clone(), recency));
        Ok(())
    }

    fn on_pair(
        &mut self,
        txn: &Transaction,
        recency: Recency,
        key: &StoreKey,
        value: &crate::LeafValue,
        _interruptor: &CancellationToken,
    ) -> Result<(), StoreError> {
        self.pairs.push((key.clone(), recency, value.read_all(txn)?));
        Ok(())
    }
}

#[tokio::test]
async fn backfill_filters_by_recency() {
    let txn = txn();
    let slice = Slice::new();
    put(&txn, &slice, "old", b"o", 1).await;
    put(&txn, &slice, "mid", b"m", 5).await;
    put(&txn, &slice, "new", b"n", 9).await;
    delete(&txn, &slice, "mid", 6).await;

    let mut cb = CollectingCallback::default();
    let superblock = slice.acquire_superblock().await;
    agnostic_backfill(
        &txn,
        superblock,
        &KeyRange::all(),
        Recency::new(5),
        &mut cb,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(cb.pairs.len(), 1);
    assert_eq!(cb.pairs[0].0, StoreKey::from("new"));
    assert_eq!(cb.deletions, vec![(StoreKey::from("mid"), Recency::new(6))]);
    assert!(cb.delete_ranges.is_empty());
}

#[tokio::test]
async fn backfill_reports_erased_ranges() {
    let txn = txn();
    let slice = Slice::new();
    for key in ["a", "b", "c"] {
        put(&txn, &slice, key, b"v", 1).await;
    }

    let superblock = slice.acquire_superblock().await;
    erase_range_generic(
        &txn,
        &slice,
        superblock,
        &AlwaysErase,
        &BlobDeleter,
        Some(&StoreKey::from("a")),
        Some(&StoreKey::from("b")),
        Recency::new(4),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let mut cb = CollectingCallback::default();
    let superblock = slice.acquire_superblock().await;
    agnostic_backfill(
        &txn,
        superblock,
        &KeyRange::all(),
        Recency::new(2),
        &mut cb,
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(cb.delete_ranges.len(), 1);
    assert!(cb.delete_ranges[0].contains(&StoreKey::from("b")));
    assert!(!cb.delete_ranges[0].contains(&StoreKey::from("a")));
    // The surviving pairs are older than since_when, so no pairs stream.
    assert!(cb.pairs.is_empty());
}

#[tokio::test]
async fn backfill_honors_cancellation() {
    let txn = txn();
    let slice = Slice::new();
    populate(&txn, &slice, 3).await;

    let interruptor = CancellationToken::new();
    interruptor.cancel();

    let mut cb = CollectingCallback::default();
    let superblock = slice.acquire_superblock().await;
    let result = agnostic_backfill(
        &txn,
        superblock,
        &KeyRange::all(),
        Recency::DISTANT_PAST,
        &mut cb,
        &interruptor,
    )
    .await;
    assert!(matches!(result, Err(StoreError::Interrupted)));
}

// ============================================================================
// Distribution
// ============================================================================

#[tokio::test]
async fn distribution_of_empty_slice_is_empty() {
    let slice = Slice::new();
    let superblock = slice.acquire_superblock().await;
    let (count, splits) = key_distribution(superblock, 3).await.unwrap();
    assert_eq!(count, 0);
    assert!(splits.is_empty());
}

#[tokio::test]
async fn distribution_depth_zero_has_no_splits() {
    let txn = txn();
    let slice = Slice::new();
    populate(&txn, &slice, 50).await;

    let superblock = slice.acquire_superblock().await;
    let (count, splits) = key_distribution(superblock, 0).await.unwrap();
    assert_eq!(count, 50);
    assert!(splits.is_empty());
}

#[tokio::test]
async fn distribution_samples_sorted_boundaries() {
    let txn = txn();
    let slice = Slice::new();
    populate(&txn, &slice, 100).await;

    let superblock = slice.acquire_superblock().await;
    let (count, splits) = key_distribution(superblock, 1).await.unwrap();
    assert_eq!(count, 100);
    assert!(!splits.is_empty());
    assert!(splits.windows(2).all(|w| w[0] < w[1]));
    assert!(splits.len() < 100);
}
