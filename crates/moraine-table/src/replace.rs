//! The replace pipeline.
//!
//! UPDATE, REPLACE, INSERT, and DELETE are all one operation: apply a user
//! function to the current document (null when the key is empty) and act on
//! what comes back. A null result empties the key, an object result fills
//! it, and anything else is a user error. The response is a datum object of
//! counters built add-if-absent; adding a field twice is an internal
//! invariant violation.

use moraine_query::{datum_type_name, print_datum, Datum, Env, QueryError, WireFunc};
use moraine_store::{find_keyvalue_location_for_write, Slice, Superblock, Transaction};
use moraine_types::{Recency, StoreKey};

use crate::error::TableError;
use crate::report::ModificationReport;
use crate::value::{delete_document, read_document, write_document};

/// The accumulating response object: a datum object whose fields are added
/// at most once per operation.
#[derive(Debug, Default)]
pub struct ResponseObject {
    fields: serde_json::Map<String, Datum>,
}

impl ResponseObject {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field unless it is already present. Returns whether the field
    /// was already there.
    pub fn add(&mut self, name: &str, value: Datum) -> bool {
        if self.fields.contains_key(name) {
            return true;
        }
        self.fields.insert(name.to_string(), value);
        false
    }

    pub fn into_datum(self) -> Datum {
        Datum::Object(self.fields)
    }
}

enum Outcome {
    Skip,
    Insert(Datum),
    Delete,
    Unchanged,
    Replace(Datum),
}

/// Applies `func` to the document at `key` and stores the result.
///
/// Returns the response object. User errors (a raising function, a
/// non-object result, a primary-key change) land in the response as
/// `errors`/`first_error` and leave storage untouched; fatal invariant
/// violations (corruption, a stored document without the primary key)
/// propagate as [`TableError`].
#[allow(clippy::too_many_arguments)]
pub async fn replace(
    txn: &Transaction,
    slice: &Slice,
    superblock: Superblock,
    primary_key_field: &str,
    key: &StoreKey,
    func: &WireFunc,
    env: &Env,
    recency: Recency,
    report: &mut ModificationReport,
) -> Result<Datum, TableError> {
    let mut resp = ResponseObject::new();

    let mut location =
        find_keyvalue_location_for_write(txn, slice, superblock, key, None).await;

    let (started_empty, old_val) = match location.value() {
        None => (true, Datum::Null),
        Some(value) => {
            let doc = read_document(value, txn, key)?;
            if doc.get(primary_key_field).is_none() {
                return Err(TableError::MissingPrimaryKey {
                    key: key.clone(),
                    field: primary_key_field.to_string(),
                });
            }
            (false, doc)
        }
    };

    match evaluate(primary_key_field, started_empty, &old_val, func, env) {
        Ok(outcome) => {
            let conflict = match outcome {
                Outcome::Skip => resp.add("skipped", 1.into()),
                Outcome::Insert(new_val) => {
                    let conflict = resp.add("inserted", 1.into());
                    write_document(&mut location, &new_val, txn, recency).await?;
                    report.added = Some(new_val);
                    conflict
                }
                Outcome::Delete => {
                    let conflict = resp.add("deleted", 1.into());
                    delete_document(&mut location, txn, recency).await?;
                    report.deleted = Some(old_val);
                    conflict
                }
                Outcome::Unchanged => resp.add("unchanged", 1.into()),
                Outcome::Replace(new_val) => {
                    let conflict = resp.add("replaced", 1.into());
                    write_document(&mut location, &new_val, txn, recency).await?;
                    report.added = Some(new_val);
                    report.deleted = Some(old_val);
                    conflict
                }
            };
            assert!(!conflict, "response field added twice");
        }
        Err(error) => {
            tracing::debug!(key = %key, error = %error, "replace raised a user error");
            // `first_error` rides on whether `errors` was newly added, so a
            // batch of failures collapses into one counter plus the first
            // message.
            let conflict = resp.add("errors", 1.into())
                || resp.add("first_error", Datum::String(error.to_string()));
            assert!(!conflict, "response field added twice");
        }
    }

    Ok(resp.into_datum())
}

/// Runs the user function and classifies the result. Everything in here is
/// a user error, never a storage mutation.
fn evaluate(
    primary_key_field: &str,
    started_empty: bool,
    old_val: &Datum,
    func: &WireFunc,
    env: &Env,
) -> Result<Outcome, QueryError> {
    let new_val = func.compile()?.call1(env, old_val)?;

    let ended_empty = match &new_val {
        Datum::Null => true,
        Datum::Object(_) => {
            if new_val.get(primary_key_field).is_none() {
                return Err(QueryError::Raised(format!(
                    "Inserted object must have primary key `{primary_key_field}`:\n{}",
                    print_datum(&new_val)
                )));
            }
            false
        }
        other => {
            return Err(QueryError::Raised(format!(
                "Inserted value must be an OBJECT (got {}):\n{}",
                datum_type_name(other),
                print_datum(other)
            )));
        }
    };

    Ok(match (started_empty, ended_empty) {
        (true, true) => Outcome::Skip,
        (true, false) => Outcome::Insert(new_val),
        (false, true) => Outcome::Delete,
        (false, false) => {
            if old_val.get(primary_key_field) == new_val.get(primary_key_field) {
                if *old_val == new_val {
                    Outcome::Unchanged
                } else {
                    Outcome::Replace(new_val)
                }
            } else {
                return Err(QueryError::Raised(format!(
                    "Primary key `{primary_key_field}` cannot be changed ({} -> {})",
                    print_datum(old_val),
                    print_datum(&new_val)
                )));
            }
        }
    })
}
