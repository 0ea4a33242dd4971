//! Secondary-index maintenance.
//!
//! Every committed primary change produces a modification report, fanned
//! out to each live index concurrently. Within one index, the stale entry
//! is deleted strictly before the fresh one is written — even when both
//! map to the same index key — serialized through a superblock handoff so
//! no other writer slips between the two steps. Across indexes no ordering
//! is guaranteed, but the fanout is a scope: the call returns only when
//! every index update has completed.

use bytes::Bytes;
use moraine_query::{encode_secondary, Env, WireFunc};
use moraine_store::{
    depth_first_traversal, find_keyvalue_location_for_write, superblock_handoff, Slice,
    Transaction, LEAF_SPAN,
};
use moraine_types::{IndexId, KeyRange, Recency};
use tokio_util::sync::CancellationToken;

use crate::error::TableError;
use crate::report::ModificationReport;
use crate::store::TableStore;
use crate::value::{delete_document, read_document, write_document};

/// One live secondary index: its id, the opaque serialized mapping, and the
/// slice holding its entries.
#[derive(Debug, Clone)]
pub struct SecondaryIndex {
    pub id: IndexId,
    /// The serialized wire function, decoded on first use.
    pub opaque_definition: Bytes,
    pub slice: Slice,
}

impl SecondaryIndex {
    pub fn new(id: IndexId, mapping: &WireFunc, slice: Slice) -> Self {
        let opaque_definition =
            Bytes::from(serde_json::to_vec(mapping).expect("mapping serialization cannot fail"));
        Self {
            id,
            opaque_definition,
            slice,
        }
    }

    /// Deserializes the mapping. A definition that does not parse is a
    /// fatal error, never a skipped index.
    fn mapping(&self) -> Result<WireFunc, TableError> {
        serde_json::from_slice(&self.opaque_definition).map_err(|error| {
            tracing::error!(index = %self.id, %error, "secondary index definition failed to decode");
            TableError::CorruptedIndexDefinition { id: self.id }
        })
    }
}

/// Applies one modification report to every given index, concurrently.
///
/// The join is the drain guard: the future resolves only after every
/// per-index update has finished, and the first error (all indexes having
/// settled) is returned.
pub async fn update_secondary_indexes(
    txn: &Transaction,
    sindexes: &[SecondaryIndex],
    report: &ModificationReport,
) -> Result<(), TableError> {
    assert!(
        !report.primary_key.is_empty(),
        "modification report fanned out before being populated"
    );

    let updates = sindexes
        .iter()
        .map(|sindex| update_single_secondary_index(txn, sindex, report));
    futures::future::join_all(updates)
        .await
        .into_iter()
        .collect()
}

async fn update_single_secondary_index(
    txn: &Transaction,
    sindex: &SecondaryIndex,
    report: &ModificationReport,
) -> Result<(), TableError> {
    let mapping = sindex.mapping()?;
    let compiled = mapping.compile().map_err(|source| TableError::IndexMapping {
        id: sindex.id,
        source,
    })?;
    let env = Env::for_index_eval();

    let mut superblock = sindex.slice.acquire_superblock().await;

    if let Some(deleted) = &report.deleted {
        let index_datum = compiled
            .call1(&env, deleted)
            .map_err(|source| TableError::IndexMapping {
                id: sindex.id,
                source,
            })?;
        let index_key = encode_secondary(&index_datum, &report.primary_key);

        let (sender, receiver) = superblock_handoff();
        {
            let mut location = find_keyvalue_location_for_write(
                txn,
                &sindex.slice,
                superblock,
                &index_key,
                Some(sender),
            )
            .await;
            delete_document(&mut location, txn, Recency::DISTANT_PAST).await?;
        }
        superblock = receiver.wait().await?;
    }

    if let Some(added) = &report.added {
        let index_datum = compiled
            .call1(&env, added)
            .map_err(|source| TableError::IndexMapping {
                id: sindex.id,
                source,
            })?;
        let index_key = encode_secondary(&index_datum, &report.primary_key);

        let mut location =
            find_keyvalue_location_for_write(txn, &sindex.slice, superblock, &index_key, None)
                .await;
        write_document(&mut location, added, txn, Recency::DISTANT_PAST).await?;
    } else {
        drop(superblock);
    }

    Ok(())
}

/// Builds the named indexes from the primary slice's current contents.
///
/// The primary range is read once; index writes proceed in leaf-sized
/// batches, re-resolving the live index set each batch so concurrently
/// dropped indexes stop receiving writes. Cancellable between batches.
pub async fn post_construct_secondary_indexes(
    store: &TableStore,
    ids: &[IndexId],
    interruptor: &CancellationToken,
) -> Result<(), TableError> {
    let txn = store.begin_transaction();
    let superblock = store.primary().acquire_superblock().await;

    let mut pairs = Vec::new();
    let mut fatal: Option<TableError> = None;
    depth_first_traversal(superblock, &KeyRange::all(), interruptor, |key, value| {
        match read_document(value, &txn, key) {
            Ok(doc) => {
                pairs.push((key.clone(), doc));
                true
            }
            Err(error) => {
                fatal = Some(error);
                false
            }
        }
    })
    .await?;
    if let Some(error) = fatal {
        return Err(error);
    }

    for batch in pairs.chunks(LEAF_SPAN) {
        if interruptor.is_cancelled() {
            return Err(moraine_store::StoreError::Interrupted.into());
        }
        let sindexes: Vec<SecondaryIndex> = store
            .secondary_indexes()
            .into_iter()
            .filter(|s| ids.contains(&s.id))
            .collect();
        if sindexes.is_empty() {
            break;
        }
        for (key, doc) in batch {
            let mut report = ModificationReport::new(key.clone());
            report.added = Some(doc.clone());
            update_secondary_indexes(&txn, &sindexes, &report).await?;
        }
    }

    tracing::debug!(indexes = ids.len(), pairs = pairs.len(), "post-constructed secondary indexes");
    Ok(())
}
