//! Modification reports: the summary of one single-key change.
//!
//! A report carries enough to recompute any derived key: the primary key,
//! the document removed (if any), and the document added (if any). Exactly
//! one side is set on insert/delete, both on replace, neither on a no-op.
//!
//! # Wire format
//!
//! ```text
//! ┌──────────────┬───────────┬──────────┬───────────┬──────────┐
//! │ pk len u8    │ pk bytes  │ tag i8   │ [deleted] │ tag i8   │ [added]
//! └──────────────┴───────────┴──────────┴───────────┴──────────┘
//! ```
//!
//! Tags: `HAS_VALUE = 0`, `HAS_NO_VALUE = 1`. Each present document is its
//! canonical byte form behind a u32 LE length prefix.

use moraine_query::Datum;
use moraine_types::StoreKey;

use crate::error::TableError;
use crate::value::{decode_document, encode_document};

const HAS_VALUE: u8 = 0;
const HAS_NO_VALUE: u8 = 1;

/// Summary of a single-key change, consumed by secondary-index maintenance
/// and the replication layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModificationReport {
    pub primary_key: StoreKey,
    pub deleted: Option<Datum>,
    pub added: Option<Datum>,
}

impl ModificationReport {
    pub fn new(primary_key: StoreKey) -> Self {
        Self {
            primary_key,
            deleted: None,
            added: None,
        }
    }

    /// True when the change turned out to be a no-op.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_none() && self.added.is_none()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(self.primary_key.len() as u8);
        buf.extend_from_slice(self.primary_key.as_bytes());
        write_optional_document(&mut buf, self.deleted.as_ref());
        write_optional_document(&mut buf, self.added.as_ref());
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TableError> {
        let mut pos = 0;
        let pk_len = *data
            .first()
            .ok_or_else(|| TableError::CorruptedReport("empty buffer".into()))?
            as usize;
        pos += 1;
        let pk = take(data, &mut pos, pk_len)?;
        let primary_key = StoreKey::from(pk);

        let deleted = read_optional_document(data, &mut pos)?;
        let added = read_optional_document(data, &mut pos)?;

        Ok(Self {
            primary_key,
            deleted,
            added,
        })
    }
}

fn write_optional_document(buf: &mut Vec<u8>, doc: Option<&Datum>) {
    match doc {
        None => buf.push(HAS_NO_VALUE),
        Some(doc) => {
            buf.push(HAS_VALUE);
            let bytes = encode_document(doc);
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(&bytes);
        }
    }
}

fn read_optional_document(data: &[u8], pos: &mut usize) -> Result<Option<Datum>, TableError> {
    let tag = take(data, pos, 1)?[0];
    match tag {
        HAS_NO_VALUE => Ok(None),
        HAS_VALUE => {
            let len_bytes = take(data, pos, 4)?;
            let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
            let bytes = take(data, pos, len)?;
            let doc = decode_document(bytes)
                .map_err(|e| TableError::CorruptedReport(e.to_string()))?;
            Ok(Some(doc))
        }
        other => Err(TableError::CorruptedReport(format!(
            "unknown presence tag {other}"
        ))),
    }
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8], TableError> {
    let end = *pos + len;
    if end > data.len() {
        return Err(TableError::CorruptedReport(format!(
            "truncated at byte {pos}"
        )));
    }
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}
