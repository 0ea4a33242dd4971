//! # moraine-query: Query fragments evaluated inside the storage core
//!
//! The storage core executes small, side-effect-free query fragments next to
//! the data: the user function of a replace, the transform chain and terminal
//! of a range scan, and the key mapping of a secondary index. This crate
//! contains everything those fragments need:
//! - Documents ([`Datum`], an alias for `serde_json::Value`) and helpers
//! - Serializable wire functions and their evaluator ([`WireFunc`], [`Expr`])
//! - Transform and terminal stages ([`Transform`], [`Terminal`], [`DatumMap`])
//! - The order-preserving datum key encoding ([`datum_key_bytes`],
//!   [`encode_secondary`])
//! - The evaluation environment ([`Env`]) with interruption and scratch
//!   accounting

mod datum;
mod env;
mod error;
mod func;
mod key_encoding;
mod transform;

pub use datum::{datum_type_name, print_datum, Datum};
pub use env::{Env, GcCheckpoint};
pub use error::QueryError;
pub use func::{CmpOp, CompiledFunc, Expr, WireFunc};
pub use key_encoding::{datum_key_bytes, encode_secondary};
pub use transform::{DatumMap, Terminal, Transform};
