//! The document codec and blob adapter.
//!
//! Documents serialize to their canonical byte form and are stored through
//! the blob interface: a fresh zero-filled reference area, one region
//! appended for the serialized bytes, the bytes written at offset zero, and
//! the area installed into the cursor's slot through the keyvalue-change
//! protocol. Allocation and write stay distinct so a later implementation
//! can stream the encoder into the allocated region.

use moraine_query::Datum;
use moraine_store::{apply_keyvalue_change, KvLocation, LeafValue, Transaction};
use moraine_types::{Recency, StoreKey};

use crate::error::TableError;

/// Canonical serialization of a document. Deterministic: object fields
/// serialize in the document map's key order.
pub fn encode_document(doc: &Datum) -> Vec<u8> {
    serde_json::to_vec(doc).expect("document serialization cannot fail")
}

/// Decodes a canonical document. Failure means corruption, not bad input.
pub fn decode_document(bytes: &[u8]) -> Result<Datum, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Reads and decodes the document behind a stored value.
pub fn read_document(
    value: &LeafValue,
    txn: &Transaction,
    key: &StoreKey,
) -> Result<Datum, TableError> {
    let bytes = value.read_all(txn)?;
    decode_document(&bytes).map_err(|source| {
        tracing::error!(key = %key, error = %source, "stored document failed to decode");
        TableError::CorruptedDocument {
            key: key.clone(),
            source,
        }
    })
}

/// Writes `doc` into the cursor's slot and commits it.
pub async fn write_document(
    location: &mut KvLocation,
    doc: &Datum,
    txn: &Transaction,
    recency: Recency,
) -> Result<(), TableError> {
    let bytes = encode_document(doc);

    let mut value = LeafValue::new_zeroed();
    let mut blob = value.blob();
    blob.append_region(txn, bytes.len() as u64)?;
    blob.write_at(txn, 0, &bytes)?;

    location.set_value(value);
    apply_keyvalue_change(txn, location, recency).await?;
    Ok(())
}

/// Clears the value at the cursor — releasing every extent it references —
/// and commits the removal.
pub async fn delete_document(
    location: &mut KvLocation,
    txn: &Transaction,
    recency: Recency,
) -> Result<(), TableError> {
    let Some(value) = location.value_mut() else {
        return Err(TableError::MissingValue {
            key: location.key().clone(),
        });
    };
    value.blob().clear(txn)?;
    location.clear_value();
    apply_keyvalue_change(txn, location, recency).await?;
    Ok(())
}
