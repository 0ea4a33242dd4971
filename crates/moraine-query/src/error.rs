//! Error type for query-fragment evaluation.
//!
//! These are *user* errors: they are produced by user-supplied functions and
//! travel back inside response objects rather than failing the enclosing
//! storage operation.

/// Errors raised while evaluating a wire function, transform, or terminal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A field lookup on an object that lacks the field.
    #[error("No attribute `{attr}` in object:\n{object}")]
    NoAttribute { attr: String, object: String },

    /// An operation applied to a datum of the wrong type.
    #[error("Expected type {expected} but found {actual}:\n{value}")]
    TypeMismatch {
        expected: &'static str,
        actual: &'static str,
        value: String,
    },

    /// A function called with the wrong number of arguments.
    #[error("Function expects {expected} argument(s) but was called with {actual}")]
    ArityMismatch { expected: u8, actual: usize },

    /// A function body referencing an argument beyond its arity.
    ///
    /// Caught at compile time, before any document is touched.
    #[error("Function body references argument {index} but only {arity} are bound")]
    UnboundArgument { index: u8, arity: u8 },

    /// An error message produced by the caller of the query layer.
    ///
    /// The replace pipeline uses this for its shape checks (non-object
    /// results, primary-key violations) so that every user-visible failure
    /// flows through one type.
    #[error("{0}")]
    Raised(String),
}
