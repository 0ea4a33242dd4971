//! # moraine-store: The transactional keyvalue collaborator
//!
//! An in-memory, cooperatively-scheduled stand-in for the B-tree engine the
//! document table runs against. It exposes the contract the table layer
//! needs and nothing below it (page layout and buffer caching are not
//! modelled):
//! - Slices, superblocks, and located cursors ([`Slice`], [`Superblock`],
//!   [`KvLocation`], [`apply_keyvalue_change`])
//! - The blob layer: values behind a small reference area with optional
//!   external extents ([`Blob`], [`LeafValue`], [`BlockStore`])
//! - Key-ordered leaf traversal ([`depth_first_traversal`])
//! - Generic range erase ([`erase_range_generic`])
//! - Recency-filtered backfill ([`agnostic_backfill`])
//! - Key-distribution sampling ([`key_distribution`])
//!
//! # Suspension points
//!
//! Everything that touches a superblock, a key slot, or the block store is
//! `async`; wire-function evaluation and document codecs above this crate
//! are not. Long traversals accept a `CancellationToken` checked between
//! leaves.

mod backfill;
mod blob;
mod distribution;
mod erase;
mod error;
mod slice;
mod traversal;

pub use backfill::{agnostic_backfill, AgnosticBackfillCallback};
pub use blob::{ref_fits, Blob, BlockId, BlockStore, LeafValue, LeafValueSizer};
pub use distribution::key_distribution;
pub use erase::{erase_range_generic, AlwaysErase, KeyTester, ValueDeleter};
pub use error::StoreError;
pub use slice::{
    apply_keyvalue_change, find_keyvalue_location_for_read, find_keyvalue_location_for_write,
    superblock_handoff, KvLocation, Slice, SliceStats, Superblock, SuperblockReceiver,
    SuperblockSender, Transaction,
};
pub use traversal::depth_first_traversal;

/// Maximum length of a value's reference area, in bytes.
pub const MAX_REF_LEN: usize = 251;

/// Size of one external extent block.
pub const BLOCK_SIZE: usize = 4096;

/// Pairs per traversal leaf. Cancellation and snapshot hand-back happen on
/// leaf boundaries.
pub const LEAF_SPAN: usize = 16;

/// Magic identifying leaves holding document values.
pub const LEAF_MAGIC: [u8; 4] = *b"rdbl";

#[cfg(test)]
mod tests;
