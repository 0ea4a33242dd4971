//! Error types for table operations.
//!
//! User-level failures (a user function raising, a shape violation in the
//! replace pipeline, a transform error in a scan) are *not* here: they
//! travel inside response objects. This type covers the storage tier and the
//! fatal invariant tier — corruption, missing primary keys, broken index
//! definitions — which abort the enclosing operation with context and are
//! never shown to users as query results.

use moraine_query::QueryError;
use moraine_store::StoreError;
use moraine_types::{IndexId, StoreKey};

/// Errors that can occur inside the document-table core.
#[derive(thiserror::Error, Debug)]
pub enum TableError {
    /// Underlying store failure (including interruption).
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored value whose bytes do not decode to a document.
    #[error("corrupted document at key `{key}`: {source}")]
    CorruptedDocument {
        key: StoreKey,
        source: serde_json::Error,
    },

    /// A stored document missing the table's primary-key field.
    #[error("stored document at key `{key}` lacks primary key field `{field}`")]
    MissingPrimaryKey { key: StoreKey, field: String },

    /// A modification report whose wire form does not parse.
    #[error("corrupted modification report: {0}")]
    CorruptedReport(String),

    /// A secondary-index definition whose bytes do not deserialize.
    #[error("corrupted definition for secondary index {id}")]
    CorruptedIndexDefinition { id: IndexId },

    /// A secondary-index mapping that failed to evaluate on a live index.
    #[error("mapping for secondary index {id} failed: {source}")]
    IndexMapping { id: IndexId, source: QueryError },

    /// A delete aimed at a key holding no value.
    #[error("delete of a key with no value at `{key}`")]
    MissingValue { key: StoreKey },
}

impl TableError {
    /// Whether this is a cancellation rather than a failure.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, TableError::Store(StoreError::Interrupted))
    }
}
