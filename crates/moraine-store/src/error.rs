//! Error types for store operations.

use crate::blob::BlockId;

/// Errors that can occur inside the keyvalue collaborator.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The operation's cancellation signal fired.
    ///
    /// Not a failure: scoped resources unwind and already-committed writes
    /// remain.
    #[error("operation interrupted")]
    Interrupted,

    /// A blob reference area that does not parse.
    #[error("corrupted blob reference: {0}")]
    CorruptedRef(String),

    /// A referenced extent block is gone.
    #[error("missing extent block {0}")]
    MissingBlock(BlockId),

    /// An extent block whose payload fails its checksum.
    #[error("extent block {0} failed checksum")]
    BlockChecksumMismatch(BlockId),

    /// A blob write outside the allocated region.
    #[error("write of {len} bytes at offset {offset} exceeds blob size {size}")]
    WriteOutOfRegion { offset: u64, len: u64, size: u64 },

    /// A superblock handoff whose sender went away without sending.
    #[error("superblock handoff abandoned")]
    HandoffAbandoned,
}
