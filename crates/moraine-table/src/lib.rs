//! # moraine-table: The document-table storage core
//!
//! This crate mediates between the query layer and the transactional
//! keyvalue engine. It implements:
//! - Point reads, writes, and deletes against the primary slice, with
//!   modification reports for derived data ([`point_read`], [`point_write`],
//!   [`point_delete`])
//! - The replace pipeline unifying UPDATE/REPLACE/INSERT/DELETE behind one
//!   user function ([`replace`])
//! - Range scans with transform chains and terminal aggregators, under a
//!   response-size budget ([`rget`])
//! - Secondary-index maintenance, fanned out concurrently per index
//!   ([`update_secondary_indexes`], [`post_construct_secondary_indexes`])
//! - Range erase and backfill ([`erase_range`], [`backfill`])
//! - The key-distribution estimator ([`distribution`])
//!
//! Documents are JSON values stored through the store's blob layer; the
//! canonical byte form and the blob plumbing live in [`value`].

mod backfill;
mod distribution;
mod erase;
mod error;
mod point;
mod replace;
mod rget;
mod sindex;
mod store;
pub mod value;

mod report;

pub use backfill::{backfill, BackfillAtom, BackfillCallback};
pub use distribution::{distribution, DistributionResponse};
pub use erase::{erase_range, DocumentDeleter};
pub use error::TableError;
pub use point::{
    point_delete, point_read, point_write, PointDeleteResponse, PointDeleteResult,
    PointReadResponse, PointWriteResponse, PointWriteResult,
};
pub use replace::{replace, ResponseObject};
pub use report::ModificationReport;
pub use rget::{estimate_response_size, rget, rget_with_budget, RgetResponse, RgetResult};
pub use sindex::{
    post_construct_secondary_indexes, update_secondary_indexes, SecondaryIndex,
};
pub use store::TableStore;

/// Response-size budget for a single range-scan chunk, in estimated bytes.
pub const RGET_CHUNK_BUDGET: usize = 1 << 20;

/// Conservative per-document estimate charged against the chunk budget.
pub const ESTIMATED_DOC_SIZE: usize = 250;

/// Documents between scratch-collection offers while accumulating a
/// group-map-reduce, whose map-shaped accumulator is expensive to size.
pub const GROUP_REDUCE_GC_INTERVAL: usize = 10_000;

/// Floor for the per-bucket estimate returned by [`distribution`].
pub const DISTRIBUTION_MIN_PER_BUCKET: i64 = 1;
