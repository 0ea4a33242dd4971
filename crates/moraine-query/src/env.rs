//! The evaluation environment.
//!
//! Every query fragment is evaluated against an [`Env`]. The environment
//! carries the operation's interruptor (when one exists) and accounts for the
//! scratch space produced by intermediate datums, so that long-running
//! aggregations can be given periodic collection points.

use std::cell::Cell;

use tokio_util::sync::CancellationToken;

use crate::datum::{datum_scratch_size, Datum};

/// Scratch bytes accumulated before a checkpoint collects.
const SCRATCH_COLLECT_THRESHOLD: u64 = 8 << 20;

/// Evaluation environment for wire functions, transforms, and terminals.
///
/// Environments are cheap and scoped to one operation. The restricted
/// environment built by [`Env::for_index_eval`] is the only one handed to
/// secondary-index mappings: it has no interruptor and carries no handle
/// through which another table could be reached.
#[derive(Debug, Default)]
pub struct Env {
    interruptor: Option<CancellationToken>,
    scratch: Cell<u64>,
}

impl Env {
    pub fn new(interruptor: Option<CancellationToken>) -> Self {
        Self {
            interruptor,
            scratch: Cell::new(0),
        }
    }

    /// The environment used to evaluate secondary-index mappings.
    pub fn for_index_eval() -> Self {
        Self::new(None)
    }

    pub fn interruptor(&self) -> Option<&CancellationToken> {
        self.interruptor.as_ref()
    }

    /// Records scratch produced by an evaluation.
    pub(crate) fn note_scratch(&self, d: &Datum) {
        self.scratch.set(self.scratch.get() + datum_scratch_size(d));
    }

    /// Opens a collection checkpoint for an aggregation loop.
    pub fn gc_checkpoint(&self) -> GcCheckpoint<'_> {
        GcCheckpoint { env: self }
    }
}

/// A scope within which accumulated scratch may be collected.
///
/// Aggregating scans call [`maybe_collect`](GcCheckpoint::maybe_collect)
/// after folding each value; the checkpoint resets the account down to the
/// footprint of the value being kept once enough scratch has built up.
#[derive(Debug)]
pub struct GcCheckpoint<'a> {
    env: &'a Env,
}

impl GcCheckpoint<'_> {
    pub fn maybe_collect(&self, keep: &Datum) {
        let scratch = self.env.scratch.get();
        if scratch >= SCRATCH_COLLECT_THRESHOLD {
            let kept = datum_scratch_size(keep);
            tracing::trace!(scratch, kept, "collecting aggregation scratch");
            self.env.scratch.set(kept);
        }
    }
}
