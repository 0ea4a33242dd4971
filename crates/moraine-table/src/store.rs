//! The table store: one primary slice, its extent blocks, and the registry
//! of live secondary indexes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use moraine_query::WireFunc;
use moraine_store::{BlockStore, Slice, Transaction};
use moraine_types::IndexId;

use crate::sindex::SecondaryIndex;

/// Everything one document table owns: the primary slice, the block store
/// its blobs allocate from, and the live secondary indexes.
#[derive(Debug, Default)]
pub struct TableStore {
    blocks: Arc<BlockStore>,
    primary: Slice,
    sindexes: Mutex<HashMap<IndexId, SecondaryIndex>>,
}

impl TableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a transaction against this table's block store.
    pub fn begin_transaction(&self) -> Transaction {
        Transaction::new(Arc::clone(&self.blocks))
    }

    pub fn primary(&self) -> &Slice {
        &self.primary
    }

    pub fn block_store(&self) -> &BlockStore {
        &self.blocks
    }

    /// Registers a new secondary index over `mapping` and returns its id.
    ///
    /// The index is live immediately — future writes maintain it — but
    /// holds nothing for existing documents until post-construction runs.
    pub fn create_secondary_index(&self, mapping: &WireFunc) -> IndexId {
        let id = IndexId::generate();
        let index = SecondaryIndex::new(id, mapping, Slice::new());
        self.sindexes.lock().unwrap().insert(id, index);
        tracing::debug!(index = %id, "created secondary index");
        id
    }

    /// Drops an index. Returns whether it existed.
    pub fn drop_secondary_index(&self, id: IndexId) -> bool {
        let dropped = self.sindexes.lock().unwrap().remove(&id).is_some();
        if dropped {
            tracing::debug!(index = %id, "dropped secondary index");
        }
        dropped
    }

    pub fn secondary_index(&self, id: IndexId) -> Option<SecondaryIndex> {
        self.sindexes.lock().unwrap().get(&id).cloned()
    }

    /// Snapshot of the live index set.
    pub fn secondary_indexes(&self) -> Vec<SecondaryIndex> {
        self.sindexes.lock().unwrap().values().cloned().collect()
    }

    /// The opaque definitions of every live index, as streamed by backfill.
    pub fn index_definitions(&self) -> HashMap<IndexId, Bytes> {
        self.sindexes
            .lock()
            .unwrap()
            .iter()
            .map(|(id, index)| (*id, index.opaque_definition.clone()))
            .collect()
    }
}
