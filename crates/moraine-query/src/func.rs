//! Serializable wire functions and their evaluator.
//!
//! A [`WireFunc`] is the serialized form of a user-supplied, side-effect-free
//! function over documents. The storage core receives them opaquely (the
//! replace pipeline's update function, a secondary index's key mapping, the
//! stages of a range scan) and compiles them on first use.
//!
//! The expression language is deliberately small: argument references,
//! constants, field projection, shallow object merge, numeric addition, and
//! comparisons. Everything dispatches by match.

use serde::{Deserialize, Serialize};

use crate::datum::{datum_type_name, print_datum, Datum};
use crate::env::Env;
use crate::error::QueryError;

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// An expression over bound arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// The n-th bound argument.
    Arg(u8),
    /// A constant datum.
    Const(Datum),
    /// Projection of a named field out of an object.
    Field { from: Box<Expr>, name: String },
    /// Shallow object merge; fields of `with` win.
    Merge { base: Box<Expr>, with: Box<Expr> },
    /// Numeric addition.
    Add { lhs: Box<Expr>, rhs: Box<Expr> },
    /// Comparison, yielding a boolean.
    Cmp {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    pub fn field(self, name: impl Into<String>) -> Expr {
        Expr::Field {
            from: Box::new(self),
            name: name.into(),
        }
    }

    pub fn merge(self, with: Expr) -> Expr {
        Expr::Merge {
            base: Box::new(self),
            with: Box::new(with),
        }
    }

    pub fn add(self, rhs: Expr) -> Expr {
        Expr::Add {
            lhs: Box::new(self),
            rhs: Box::new(rhs),
        }
    }

    pub fn cmp(op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Cmp {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// The highest argument index referenced, if any.
    fn max_arg(&self) -> Option<u8> {
        match self {
            Expr::Arg(i) => Some(*i),
            Expr::Const(_) => None,
            Expr::Field { from, .. } => from.max_arg(),
            Expr::Merge { base: a, with: b }
            | Expr::Add { lhs: a, rhs: b }
            | Expr::Cmp { lhs: a, rhs: b, .. } => a.max_arg().max(b.max_arg()),
        }
    }
}

/// The serialized form of a user function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFunc {
    params: u8,
    body: Expr,
}

impl WireFunc {
    pub fn new(params: u8, body: Expr) -> Self {
        Self { params, body }
    }

    /// A unary function ignoring its argument and returning `datum`.
    pub fn constant(datum: Datum) -> Self {
        Self {
            params: 1,
            body: Expr::Const(datum),
        }
    }

    /// The identity function over one argument.
    pub fn identity() -> Self {
        Self {
            params: 1,
            body: Expr::Arg(0),
        }
    }

    pub fn params(&self) -> u8 {
        self.params
    }

    /// Validates the body against the arity and returns a callable.
    pub fn compile(&self) -> Result<CompiledFunc<'_>, QueryError> {
        if let Some(index) = self.body.max_arg() {
            if index >= self.params {
                return Err(QueryError::UnboundArgument {
                    index,
                    arity: self.params,
                });
            }
        }
        Ok(CompiledFunc { func: self })
    }
}

/// A compiled wire function, ready to call.
#[derive(Debug, Clone, Copy)]
pub struct CompiledFunc<'a> {
    func: &'a WireFunc,
}

impl CompiledFunc<'_> {
    pub fn call(&self, env: &Env, args: &[&Datum]) -> Result<Datum, QueryError> {
        if args.len() != usize::from(self.func.params) {
            return Err(QueryError::ArityMismatch {
                expected: self.func.params,
                actual: args.len(),
            });
        }
        let result = eval(&self.func.body, args)?;
        env.note_scratch(&result);
        Ok(result)
    }

    pub fn call1(&self, env: &Env, a: &Datum) -> Result<Datum, QueryError> {
        self.call(env, &[a])
    }

    pub fn call2(&self, env: &Env, a: &Datum, b: &Datum) -> Result<Datum, QueryError> {
        self.call(env, &[a, b])
    }
}

fn eval(expr: &Expr, args: &[&Datum]) -> Result<Datum, QueryError> {
    match expr {
        Expr::Arg(i) => Ok(args[usize::from(*i)].clone()),
        Expr::Const(d) => Ok(d.clone()),
        Expr::Field { from, name } => {
            let obj = eval(from, args)?;
            let Datum::Object(fields) = &obj else {
                return Err(QueryError::TypeMismatch {
                    expected: "OBJECT",
                    actual: datum_type_name(&obj),
                    value: print_datum(&obj),
                });
            };
            fields
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::NoAttribute {
                    attr: name.clone(),
                    object: print_datum(&obj),
                })
        }
        Expr::Merge { base, with } => {
            let base = eval(base, args)?;
            let with = eval(with, args)?;
            match (base, with) {
                (Datum::Object(mut base), Datum::Object(with)) => {
                    for (k, v) in with {
                        base.insert(k, v);
                    }
                    Ok(Datum::Object(base))
                }
                (other, Datum::Object(_)) | (_, other) => Err(QueryError::TypeMismatch {
                    expected: "OBJECT",
                    actual: datum_type_name(&other),
                    value: print_datum(&other),
                }),
            }
        }
        Expr::Add { lhs, rhs } => {
            let lhs = eval(lhs, args)?;
            let rhs = eval(rhs, args)?;
            let (Some(a), Some(b)) = (lhs.as_f64(), rhs.as_f64()) else {
                let bad = if lhs.as_f64().is_none() { lhs } else { rhs };
                return Err(QueryError::TypeMismatch {
                    expected: "NUMBER",
                    actual: datum_type_name(&bad),
                    value: print_datum(&bad),
                });
            };
            Ok(number(a + b))
        }
        Expr::Cmp { op, lhs, rhs } => {
            let lhs = eval(lhs, args)?;
            let rhs = eval(rhs, args)?;
            let result = match op {
                CmpOp::Eq => lhs == rhs,
                CmpOp::Ne => lhs != rhs,
                CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => {
                    let ord = ordered_cmp(&lhs, &rhs)?;
                    match op {
                        CmpOp::Lt => ord.is_lt(),
                        CmpOp::Le => ord.is_le(),
                        CmpOp::Gt => ord.is_gt(),
                        CmpOp::Ge => ord.is_ge(),
                        CmpOp::Eq | CmpOp::Ne => unreachable!(),
                    }
                }
            };
            Ok(Datum::Bool(result))
        }
    }
}

/// Ordering comparison for the scalar types; composites are not ordered.
fn ordered_cmp(lhs: &Datum, rhs: &Datum) -> Result<std::cmp::Ordering, QueryError> {
    match (lhs, rhs) {
        (Datum::Number(_), Datum::Number(_)) => {
            let (a, b) = (lhs.as_f64().unwrap(), rhs.as_f64().unwrap());
            Ok(a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal))
        }
        (Datum::String(a), Datum::String(b)) => Ok(a.cmp(b)),
        (Datum::Bool(a), Datum::Bool(b)) => Ok(a.cmp(b)),
        _ => Err(QueryError::TypeMismatch {
            expected: datum_type_name(lhs),
            actual: datum_type_name(rhs),
            value: print_datum(rhs),
        }),
    }
}

/// Builds a number datum; non-finite results become null.
fn number(v: f64) -> Datum {
    serde_json::Number::from_f64(v).map_or(Datum::Null, Datum::Number)
}
