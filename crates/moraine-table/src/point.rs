//! Point operations against the primary slice.

use moraine_query::Datum;
use moraine_store::{
    find_keyvalue_location_for_read, find_keyvalue_location_for_write, Slice, Superblock,
    Transaction,
};
use moraine_types::{Recency, StoreKey};

use crate::error::TableError;
use crate::report::ModificationReport;
use crate::value::{delete_document, read_document, write_document};

/// Response of a point read. Absence is a null document: the query layer
/// distinguishes by type, not by a separate optionality channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PointReadResponse {
    pub data: Datum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointWriteResult {
    Stored,
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointWriteResponse {
    pub result: PointWriteResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointDeleteResult {
    Deleted,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointDeleteResponse {
    pub result: PointDeleteResult,
}

/// Reads the document at `key`, or null if the key holds nothing.
pub async fn point_read(
    txn: &Transaction,
    slice: &Slice,
    superblock: Superblock,
    key: &StoreKey,
) -> Result<PointReadResponse, TableError> {
    let location = find_keyvalue_location_for_read(txn, slice, superblock, key).await;
    let data = match location.value() {
        None => Datum::Null,
        Some(value) => read_document(value, txn, key)?,
    };
    Ok(PointReadResponse { data })
}

/// Writes `doc` at `key`.
///
/// When the key already holds a document and `overwrite` is false the write
/// is suppressed and the result is `Duplicate` — but the modification
/// report still carries the existing document in `deleted`, so index
/// maintenance observes the same state either way. `added` is set only when
/// the write actually happens.
pub async fn point_write(
    txn: &Transaction,
    slice: &Slice,
    superblock: Superblock,
    key: &StoreKey,
    doc: Datum,
    overwrite: bool,
    recency: Recency,
    report: &mut ModificationReport,
) -> Result<PointWriteResponse, TableError> {
    let mut location =
        find_keyvalue_location_for_write(txn, slice, superblock, key, None).await;
    let had_value = location.value().is_some();

    if let Some(value) = location.value() {
        report.deleted = Some(read_document(value, txn, key)?);
    }

    let result = if overwrite || !had_value {
        report.added = Some(doc.clone());
        write_document(&mut location, &doc, txn, recency).await?;
        PointWriteResult::Stored
    } else {
        tracing::debug!(key = %key, "suppressed write to an occupied key");
        PointWriteResult::Duplicate
    };

    Ok(PointWriteResponse { result })
}

/// Deletes the document at `key`, if there is one.
pub async fn point_delete(
    txn: &Transaction,
    slice: &Slice,
    superblock: Superblock,
    key: &StoreKey,
    recency: Recency,
    report: &mut ModificationReport,
) -> Result<PointDeleteResponse, TableError> {
    let mut location =
        find_keyvalue_location_for_write(txn, slice, superblock, key, None).await;

    let result = match location.value() {
        Some(value) => {
            report.deleted = Some(read_document(value, txn, key)?);
            delete_document(&mut location, txn, recency).await?;
            PointDeleteResult::Deleted
        }
        None => PointDeleteResult::Missing,
    };

    Ok(PointDeleteResponse { result })
}
