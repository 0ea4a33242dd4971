//! Transform and terminal stages of a range scan.
//!
//! A transform takes one document and yields zero or more documents; map,
//! filter, and concat-map all share that signature. A terminal consumes every
//! surviving document and folds it into a single accumulator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::datum::{datum_type_name, print_datum, Datum};
use crate::env::Env;
use crate::error::QueryError;
use crate::func::WireFunc;
use crate::key_encoding::datum_key_bytes;

/// A single transform stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Transform {
    /// One document in, one document out.
    Map(WireFunc),
    /// Keeps the document when the predicate returns `true`.
    Filter(WireFunc),
    /// The function must return an array; its elements are emitted.
    ConcatMap(WireFunc),
}

impl Transform {
    /// Applies this stage to one document.
    pub fn apply(&self, env: &Env, doc: &Datum) -> Result<Vec<Datum>, QueryError> {
        match self {
            Transform::Map(f) => Ok(vec![f.compile()?.call1(env, doc)?]),
            Transform::Filter(f) => {
                let verdict = f.compile()?.call1(env, doc)?;
                match verdict {
                    Datum::Bool(true) => Ok(vec![doc.clone()]),
                    Datum::Bool(false) => Ok(vec![]),
                    other => Err(QueryError::TypeMismatch {
                        expected: "BOOLEAN",
                        actual: datum_type_name(&other),
                        value: print_datum(&other),
                    }),
                }
            }
            Transform::ConcatMap(f) => {
                let result = f.compile()?.call1(env, doc)?;
                match result {
                    Datum::Array(items) => Ok(items),
                    other => Err(QueryError::TypeMismatch {
                        expected: "ARRAY",
                        actual: datum_type_name(&other),
                        value: print_datum(&other),
                    }),
                }
            }
        }
    }
}

/// A terminal aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Terminal {
    /// Folds every document into a running datum with a binary function.
    Reduce { base: Datum, func: WireFunc },
    /// Groups documents by `group`, maps each through `map`, and reduces
    /// per group with `reduce`.
    GroupMapReduce {
        group: WireFunc,
        map: WireFunc,
        reduce: WireFunc,
    },
}

/// Accumulator for group-map-reduce, keyed by the datum key encoding so
/// groups stay sorted by their group datum.
#[derive(Debug, Default)]
pub struct DatumMap {
    entries: BTreeMap<Vec<u8>, (Datum, Datum)>,
}

impl DatumMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, group: &Datum) -> Option<&Datum> {
        self.entries
            .get(&datum_key_bytes(group))
            .map(|(_, reduction)| reduction)
    }

    /// Folds `mapped` into `group`'s slot: the first value for a group is
    /// stored as-is, later values go through `reduce(acc, mapped)`.
    pub fn insert_or_reduce(
        &mut self,
        env: &Env,
        group: Datum,
        mapped: Datum,
        reduce: &WireFunc,
    ) -> Result<(), QueryError> {
        let key = datum_key_bytes(&group);
        match self.entries.get_mut(&key) {
            Some((_, acc)) => {
                *acc = reduce.compile()?.call2(env, acc, &mapped)?;
            }
            None => {
                self.entries.insert(key, (group, mapped));
            }
        }
        Ok(())
    }

    /// Turns the lazy accumulator into the concrete sorted sequence of
    /// `(group, reduction)` pairs.
    pub fn finalize(self) -> Vec<(Datum, Datum)> {
        self.entries.into_values().collect()
    }

    /// The concrete datum form: an array of `{group, reduction}` objects.
    pub fn to_datum(&self) -> Datum {
        Datum::Array(
            self.entries
                .values()
                .map(|(group, reduction)| {
                    serde_json::json!({ "group": group, "reduction": reduction })
                })
                .collect(),
        )
    }
}
