//! The range-scan engine.
//!
//! Walks a key range in order, folds every stored document through the
//! transform chain, and either streams the survivors (bounded by a
//! response-size budget) or folds them into a terminal aggregator (which
//! must consume the whole range, so it is never truncated).

use moraine_query::{Datum, DatumMap, Env, QueryError, Terminal, Transform};
use moraine_store::{depth_first_traversal, Superblock, Transaction};
use moraine_types::{KeyRange, StoreKey};
use tokio_util::sync::CancellationToken;

use crate::error::TableError;
use crate::value::read_document;
use crate::{ESTIMATED_DOC_SIZE, GROUP_REDUCE_GC_INTERVAL, RGET_CHUNK_BUDGET};

/// The outcome of a range scan.
#[derive(Debug, PartialEq)]
pub enum RgetResult {
    /// Ordered surviving pairs, possibly truncated by the budget.
    Stream(Vec<(StoreKey, Datum)>),
    /// The finalized datum of a reduce terminal.
    Reduction(Datum),
    /// The finalized `(group, reduction)` pairs of a group-map-reduce.
    Grouped(Vec<(Datum, Datum)>),
    /// A user error that poisoned the scan. No partial stream accompanies
    /// it.
    Error(QueryError),
}

#[derive(Debug, PartialEq)]
pub struct RgetResponse {
    pub result: RgetResult,
    /// The greatest store key examined, whether or not it produced output.
    /// A resuming caller never re-examines it.
    pub last_considered_key: StoreKey,
    /// Whether the size budget stopped the scan early.
    pub truncated: bool,
}

/// Estimated response weight of one document.
///
/// A coarse constant, deliberately on the high side: the budget contract
/// only requires that the scan stop once the estimate crosses it.
pub fn estimate_response_size(_doc: &Datum) -> usize {
    ESTIMATED_DOC_SIZE
}

/// Scans `range` with the default chunk budget.
#[allow(clippy::too_many_arguments)]
pub async fn rget(
    txn: &Transaction,
    superblock: Superblock,
    range: &KeyRange,
    env: &Env,
    transforms: &[Transform],
    terminal: Option<&Terminal>,
    interruptor: &CancellationToken,
) -> Result<RgetResponse, TableError> {
    rget_with_budget(
        txn,
        superblock,
        range,
        env,
        transforms,
        terminal,
        interruptor,
        RGET_CHUNK_BUDGET,
    )
    .await
}

enum Accumulator {
    Stream(Vec<(StoreKey, Datum)>),
    Reduction(Datum),
    Grouped(DatumMap),
}

/// Scans `range` with an explicit budget (exposed so callers with their own
/// chunking policy — and tests — can tighten it).
#[allow(clippy::too_many_arguments)]
pub async fn rget_with_budget(
    txn: &Transaction,
    superblock: Superblock,
    range: &KeyRange,
    env: &Env,
    transforms: &[Transform],
    terminal: Option<&Terminal>,
    interruptor: &CancellationToken,
    budget: usize,
) -> Result<RgetResponse, TableError> {
    let mut last_considered_key = range.left.clone();

    // Validate the terminal before touching the range; a broken aggregator
    // poisons the scan without reading anything.
    if let Some(error) = validate_terminal(terminal) {
        return Ok(RgetResponse {
            result: RgetResult::Error(error),
            last_considered_key,
            truncated: false,
        });
    }

    let mut acc = match terminal {
        None => Accumulator::Stream(Vec::new()),
        Some(Terminal::Reduce { base, .. }) => Accumulator::Reduction(base.clone()),
        Some(Terminal::GroupMapReduce { .. }) => Accumulator::Grouped(DatumMap::new()),
    };

    let mut cumulative_size = 0usize;
    let mut processed = 0usize;
    let mut user_error: Option<QueryError> = None;
    let mut fatal: Option<TableError> = None;

    depth_first_traversal(superblock, range, interruptor, |key, value| {
        if *key > last_considered_key {
            last_considered_key = key.clone();
        }

        let doc = match read_document(value, txn, key) {
            Ok(doc) => doc,
            Err(error) => {
                fatal = Some(error);
                return false;
            }
        };

        // Fold through the transform chain: each stage maps one document to
        // zero or more.
        let mut data = vec![doc];
        for transform in transforms {
            let mut next = Vec::new();
            for doc in &data {
                match transform.apply(env, doc) {
                    Ok(mut out) => next.append(&mut out),
                    Err(error) => {
                        user_error = Some(error);
                        return false;
                    }
                }
            }
            data = next;
        }

        match (&mut acc, terminal) {
            (Accumulator::Stream(stream), _) => {
                for doc in data {
                    cumulative_size += estimate_response_size(&doc);
                    stream.push((key.clone(), doc));
                }
                cumulative_size < budget
            }
            (Accumulator::Reduction(running), Some(Terminal::Reduce { func, .. })) => {
                // Reductions throw most of what they touch away; offer a
                // collection point after every folded value.
                let checkpoint = env.gc_checkpoint();
                for doc in data {
                    match func.compile().and_then(|f| f.call2(env, running, &doc)) {
                        Ok(next) => *running = next,
                        Err(error) => {
                            user_error = Some(error);
                            return false;
                        }
                    }
                    checkpoint.maybe_collect(running);
                }
                true
            }
            (Accumulator::Grouped(map), Some(Terminal::GroupMapReduce { group, map: map_fn, reduce })) => {
                let checkpoint = env.gc_checkpoint();
                for doc in data {
                    let folded = group
                        .compile()
                        .and_then(|g| g.call1(env, &doc))
                        .and_then(|group_datum| {
                            let mapped = map_fn.compile()?.call1(env, &doc)?;
                            map.insert_or_reduce(env, group_datum, mapped, reduce)
                        });
                    if let Err(error) = folded {
                        user_error = Some(error);
                        return false;
                    }
                    processed += 1;
                    if processed % GROUP_REDUCE_GC_INTERVAL == 0 {
                        checkpoint.maybe_collect(&map.to_datum());
                    }
                }
                true
            }
            _ => unreachable!("accumulator shape fixed at initialization"),
        }
    })
    .await?;

    if let Some(error) = fatal {
        return Err(error);
    }

    if let Some(error) = user_error {
        return Ok(RgetResponse {
            result: RgetResult::Error(error),
            last_considered_key,
            truncated: false,
        });
    }

    let truncated = cumulative_size >= budget;
    if truncated {
        tracing::debug!(
            cumulative_size,
            budget,
            last_considered_key = %last_considered_key,
            "range scan hit its chunk budget"
        );
    }

    // Finalize: lazy accumulators become concrete datums.
    let result = match acc {
        Accumulator::Stream(stream) => RgetResult::Stream(stream),
        Accumulator::Reduction(datum) => RgetResult::Reduction(datum),
        Accumulator::Grouped(map) => RgetResult::Grouped(map.finalize()),
    };

    Ok(RgetResponse {
        result,
        last_considered_key,
        truncated,
    })
}

/// Compiles every function the terminal will call, reporting the first
/// failure.
fn validate_terminal(terminal: Option<&Terminal>) -> Option<QueryError> {
    let funcs: Vec<&moraine_query::WireFunc> = match terminal {
        None => return None,
        Some(Terminal::Reduce { func, .. }) => vec![func],
        Some(Terminal::GroupMapReduce { group, map, reduce }) => vec![group, map, reduce],
    };
    funcs.into_iter().find_map(|f| f.compile().err())
}
