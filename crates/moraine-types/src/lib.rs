//! # moraine-types: Shared primitives for the moraine storage core
//!
//! This crate contains the types shared by every layer of the document-table
//! storage core:
//! - Store keys and key ranges ([`StoreKey`], [`KeyRange`])
//! - Modification recency stamps ([`Recency`])
//! - Secondary-index identifiers ([`IndexId`])

mod key;

pub use key::{KeyRange, StoreKey, MAX_STORE_KEY_LEN};

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// Recency
// ============================================================================

/// Timestamp stamped on every committed keyvalue change.
///
/// Recencies are totally ordered and drive backfill filtering: a replica
/// asking for changes "since" a recency receives exactly the pairs and
/// deletions stamped with a newer one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Recency(u64);

impl Recency {
    /// Older than every real modification. Used for writes whose ordering
    /// relative to replication does not matter (secondary-index slots).
    pub const DISTANT_PAST: Recency = Recency(0);

    pub fn new(t: u64) -> Self {
        Self(t)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Display for Recency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Recency {
    fn from(t: u64) -> Self {
        Self(t)
    }
}

impl From<Recency> for u64 {
    fn from(r: Recency) -> Self {
        r.0
    }
}

// ============================================================================
// Index ID
// ============================================================================

/// Unique identifier for a secondary index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct IndexId(Uuid);

impl IndexId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
