//! Backfill: ordered replay of a table's recent history for replication.

use std::collections::HashMap;

use bytes::Bytes;
use moraine_query::Datum;
use moraine_store::{
    agnostic_backfill, AgnosticBackfillCallback, LeafValue, StoreError, Superblock, Transaction,
};
use moraine_types::{IndexId, KeyRange, Recency, StoreKey};
use tokio_util::sync::CancellationToken;

use crate::error::TableError;
use crate::value::read_document;

/// One replayed pair.
#[derive(Debug, Clone, PartialEq)]
pub struct BackfillAtom {
    pub key: StoreKey,
    pub recency: Recency,
    pub doc: Datum,
}

/// Receiver of a table backfill. Every call carries the cancellation
/// signal; the stream stops between events once it fires.
pub trait BackfillCallback {
    fn on_delete_range(
        &mut self,
        range: &KeyRange,
        interruptor: &CancellationToken,
    ) -> Result<(), TableError>;

    fn on_deletion(
        &mut self,
        key: &StoreKey,
        recency: Recency,
        interruptor: &CancellationToken,
    ) -> Result<(), TableError>;

    fn on_keyvalue(
        &mut self,
        atom: BackfillAtom,
        interruptor: &CancellationToken,
    ) -> Result<(), TableError>;

    fn on_sindexes(
        &mut self,
        definitions: &HashMap<IndexId, Bytes>,
        interruptor: &CancellationToken,
    ) -> Result<(), TableError>;
}

/// Adapts the engine-level stream to documents, asserting that everything
/// the engine hands over lies inside the requested range.
struct DocumentBackfill<'a> {
    inner: &'a mut dyn BackfillCallback,
    range: &'a KeyRange,
    /// First table-level failure; the engine sees a stop signal and the
    /// caller gets this error back.
    failed: Option<TableError>,
}

impl DocumentBackfill<'_> {
    fn forward(&mut self, result: Result<(), TableError>) -> Result<(), StoreError> {
        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                self.failed = Some(error);
                Err(StoreError::Interrupted)
            }
        }
    }
}

impl AgnosticBackfillCallback for DocumentBackfill<'_> {
    fn on_delete_range(
        &mut self,
        range: &KeyRange,
        interruptor: &CancellationToken,
    ) -> Result<(), StoreError> {
        debug_assert!(self.range.is_superset(range), "marker outside backfill range");
        let result = self.inner.on_delete_range(range, interruptor);
        self.forward(result)
    }

    fn on_deletion(
        &mut self,
        key: &StoreKey,
        recency: Recency,
        interruptor: &CancellationToken,
    ) -> Result<(), StoreError> {
        debug_assert!(self.range.contains(key), "deletion outside backfill range");
        let result = self.inner.on_deletion(key, recency, interruptor);
        self.forward(result)
    }

    fn on_pair(
        &mut self,
        txn: &Transaction,
        recency: Recency,
        key: &StoreKey,
        value: &LeafValue,
        interruptor: &CancellationToken,
    ) -> Result<(), StoreError> {
        debug_assert!(self.range.contains(key), "pair outside backfill range");
        let result = read_document(value, txn, key).and_then(|doc| {
            self.inner.on_keyvalue(
                BackfillAtom {
                    key: key.clone(),
                    recency,
                    doc,
                },
                interruptor,
            )
        });
        self.forward(result)
    }
}

/// Streams the range's history since `since_when` into `callback`: the
/// current index definitions first, then erase markers, deletions, and
/// pairs in key order.
pub async fn backfill(
    txn: &Transaction,
    superblock: Superblock,
    range: &KeyRange,
    since_when: Recency,
    callback: &mut dyn BackfillCallback,
    index_definitions: &HashMap<IndexId, Bytes>,
    interruptor: &CancellationToken,
) -> Result<(), TableError> {
    callback.on_sindexes(index_definitions, interruptor)?;

    let mut adapter = DocumentBackfill {
        inner: callback,
        range,
        failed: None,
    };

    let result = agnostic_backfill(
        txn,
        superblock,
        range,
        since_when,
        &mut adapter,
        interruptor,
    )
    .await;

    match adapter.failed {
        Some(error) => Err(error),
        None => result.map_err(TableError::from),
    }
}
