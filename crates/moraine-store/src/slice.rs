//! Slices, superblocks, transactions, and located cursors.
//!
//! A [`Slice`] is one B-tree. Its [`Superblock`] is the exclusive root
//! handle: whoever holds it may navigate the tree, and nobody else may.
//! Locating a key yields a [`KvLocation`] that owns the key's slot until the
//! change is committed through [`apply_keyvalue_change`]; the superblock is
//! released (or handed off) as soon as the slot is located, which is what
//! lets independent writes pipeline.
//!
//! Deletion entries: clearing a slot leaves the key behind with its recency
//! and no value. Reads and traversals skip such entries; backfill reports
//! them.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use moraine_types::{KeyRange, Recency, StoreKey};
use tokio::sync::{oneshot, Mutex, OwnedMutexGuard};

use crate::blob::{BlockStore, LeafValue, LeafValueSizer};
use crate::error::StoreError;
use crate::MAX_REF_LEN;

// ============================================================================
// Transaction
// ============================================================================

/// Scoped handle through which all blob allocation and slot commits run.
///
/// Durability policy lives with the caller; dropping a transaction releases
/// nothing it did not own.
#[derive(Debug, Clone)]
pub struct Transaction {
    blocks: Arc<BlockStore>,
}

impl Transaction {
    pub fn new(blocks: Arc<BlockStore>) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }
}

// ============================================================================
// Slice
// ============================================================================

/// Per-slice operation counters.
#[derive(Debug, Default)]
pub struct SliceStats {
    pub keys_read: AtomicU64,
    pub keys_set: AtomicU64,
    pub keys_deleted: AtomicU64,
}

#[derive(Debug)]
pub(crate) struct Slot {
    /// The live value, or `None` for deletion entries and placeholders.
    pub(crate) value: Option<LeafValue>,
    /// Stamp of the last committed change; `None` until first commit.
    pub(crate) recency: Option<Recency>,
}

#[derive(Debug, Default)]
pub(crate) struct TreeState {
    pub(crate) slots: BTreeMap<StoreKey, Arc<Mutex<Slot>>>,
    /// Ranges erased wholesale, with the recency of the erase. Consumed by
    /// backfill as delete-range markers.
    pub(crate) erased: Vec<(KeyRange, Recency)>,
}

impl TreeState {
    pub(crate) fn slots_in_range(
        &self,
        range: &KeyRange,
    ) -> Vec<(StoreKey, Arc<Mutex<Slot>>)> {
        let right = match &range.right {
            Some(r) => Bound::Excluded(r),
            None => Bound::Unbounded,
        };
        self.slots
            .range::<StoreKey, _>((Bound::Included(&range.left), right))
            .map(|(k, slot)| (k.clone(), Arc::clone(slot)))
            .collect()
    }
}

/// One B-tree. Cheap to clone; all clones share the same tree.
#[derive(Debug, Clone, Default)]
pub struct Slice {
    tree: Arc<Mutex<TreeState>>,
    stats: Arc<SliceStats>,
    root_eviction_priority: Arc<AtomicI64>,
}

impl Slice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive root handle. Suspension point.
    pub async fn acquire_superblock(&self) -> Superblock {
        Superblock {
            guard: Arc::clone(&self.tree).lock_owned().await,
        }
    }

    pub fn stats(&self) -> &SliceStats {
        &self.stats
    }

    /// Eviction priority of the root, tracking the live-entry count.
    pub fn root_eviction_priority(&self) -> i64 {
        self.root_eviction_priority.load(Ordering::Relaxed)
    }

    /// Accounting hook for bulk erases, which bypass the cursor protocol.
    pub(crate) fn note_value_erased(&self) {
        self.root_eviction_priority.fetch_sub(1, Ordering::Relaxed);
        self.stats.keys_deleted.fetch_add(1, Ordering::Relaxed);
    }
}

// ============================================================================
// Superblock and handoff
// ============================================================================

/// The exclusive root handle of one slice.
#[derive(Debug)]
pub struct Superblock {
    pub(crate) guard: OwnedMutexGuard<TreeState>,
}

/// Sending half of a superblock handoff. Consuming `send` makes a second
/// set unrepresentable.
#[derive(Debug)]
pub struct SuperblockSender {
    tx: oneshot::Sender<Superblock>,
}

impl SuperblockSender {
    pub fn send(self, superblock: Superblock) {
        // A dropped receiver just releases the superblock.
        let _ = self.tx.send(superblock);
    }
}

/// Receiving half of a superblock handoff.
#[derive(Debug)]
pub struct SuperblockReceiver {
    rx: oneshot::Receiver<Superblock>,
}

impl SuperblockReceiver {
    pub async fn wait(self) -> Result<Superblock, StoreError> {
        self.rx.await.map_err(|_| StoreError::HandoffAbandoned)
    }
}

/// Creates a one-shot superblock handoff pair.
pub fn superblock_handoff() -> (SuperblockSender, SuperblockReceiver) {
    let (tx, rx) = oneshot::channel();
    (SuperblockSender { tx }, SuperblockReceiver { rx })
}

// ============================================================================
// Located cursors
// ============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Staged {
    None,
    Set(LeafValue),
    Clear,
}

/// A cursor positioned at one key, owning that key's slot.
///
/// Stage a change with [`set_value`](KvLocation::set_value) or
/// [`clear_value`](KvLocation::clear_value), then commit it with
/// [`apply_keyvalue_change`]. Dropping a cursor with an uncommitted staged
/// change is a programming error.
#[derive(Debug)]
pub struct KvLocation {
    key: StoreKey,
    slot: Option<OwnedMutexGuard<Slot>>,
    staged: Staged,
    stats: Arc<SliceStats>,
    root_eviction_priority: Arc<AtomicI64>,
}

impl KvLocation {
    pub fn key(&self) -> &StoreKey {
        &self.key
    }

    /// The live value at the key, if any.
    pub fn value(&self) -> Option<&LeafValue> {
        self.slot.as_ref().and_then(|s| s.value.as_ref())
    }

    /// Mutable access to the live value (for releasing its extents before a
    /// delete).
    pub fn value_mut(&mut self) -> Option<&mut LeafValue> {
        self.slot.as_mut().and_then(|s| s.value.as_mut())
    }

    /// Stages a new value for the slot.
    pub fn set_value(&mut self, value: LeafValue) {
        debug_assert!(
            LeafValueSizer::fits(&value, MAX_REF_LEN),
            "reference area exceeds the on-leaf limit"
        );
        debug_assert!(self.slot.is_some(), "set through a read-located cursor");
        self.staged = Staged::Set(value);
    }

    /// Stages removal of the slot's value.
    pub fn clear_value(&mut self) {
        debug_assert!(self.slot.is_some(), "clear through a read-located cursor");
        self.staged = Staged::Clear;
    }
}

impl Drop for KvLocation {
    fn drop(&mut self) {
        debug_assert!(
            self.staged == Staged::None || std::thread::panicking(),
            "dropped a dirty cursor for key `{}` without committing",
            self.key
        );
    }
}

/// Locates `key` for reading. The superblock is released once the slot is
/// found; the cursor keeps the slot until dropped.
pub async fn find_keyvalue_location_for_read(
    _txn: &Transaction,
    slice: &Slice,
    superblock: Superblock,
    key: &StoreKey,
) -> KvLocation {
    let slot_arc = superblock.guard.slots.get(key).cloned();
    drop(superblock);

    let slot = match slot_arc {
        Some(arc) => Some(arc.lock_owned().await),
        None => None,
    };
    if slot.as_ref().is_some_and(|s| s.value.is_some()) {
        slice.stats.keys_read.fetch_add(1, Ordering::Relaxed);
    }

    KvLocation {
        key: key.clone(),
        slot,
        staged: Staged::None,
        stats: Arc::clone(&slice.stats),
        root_eviction_priority: Arc::clone(&slice.root_eviction_priority),
    }
}

/// Locates `key` for writing, creating the slot if the key is absent.
///
/// The superblock is handed to `pass_back` (if provided) or released as
/// soon as the slot is locked, so the next acquirer can proceed while this
/// cursor commits.
pub async fn find_keyvalue_location_for_write(
    _txn: &Transaction,
    slice: &Slice,
    mut superblock: Superblock,
    key: &StoreKey,
    pass_back: Option<SuperblockSender>,
) -> KvLocation {
    let slot_arc = Arc::clone(superblock.guard.slots.entry(key.clone()).or_insert_with(|| {
        Arc::new(Mutex::new(Slot {
            value: None,
            recency: None,
        }))
    }));

    let slot = slot_arc.lock_owned().await;
    match pass_back {
        Some(sender) => sender.send(superblock),
        None => drop(superblock),
    }

    KvLocation {
        key: key.clone(),
        slot: Some(slot),
        staged: Staged::None,
        stats: Arc::clone(&slice.stats),
        root_eviction_priority: Arc::clone(&slice.root_eviction_priority),
    }
}

/// Commits the cursor's staged change, stamping `recency` on the slot and
/// updating the slice's accounting.
pub async fn apply_keyvalue_change(
    _txn: &Transaction,
    location: &mut KvLocation,
    recency: Recency,
) -> Result<(), StoreError> {
    let staged = std::mem::replace(&mut location.staged, Staged::None);
    debug_assert!(staged != Staged::None, "commit with nothing staged");

    let slot = location
        .slot
        .as_mut()
        .expect("commit through a read-located cursor");

    match staged {
        Staged::None => {}
        Staged::Set(value) => {
            if slot.value.is_none() {
                location
                    .root_eviction_priority
                    .fetch_add(1, Ordering::Relaxed);
            }
            slot.value = Some(value);
            slot.recency = Some(recency);
            location.stats.keys_set.fetch_add(1, Ordering::Relaxed);
        }
        Staged::Clear => {
            if slot.value.is_some() {
                location
                    .root_eviction_priority
                    .fetch_sub(1, Ordering::Relaxed);
            }
            slot.value = None;
            slot.recency = Some(recency);
            location.stats.keys_deleted.fetch_add(1, Ordering::Relaxed);
        }
    }

    // Leaf writes land cooperatively; give peers a turn.
    tokio::task::yield_now().await;
    Ok(())
}
