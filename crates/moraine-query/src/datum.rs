//! The document type and small helpers over it.

/// A document: a self-describing JSON value.
///
/// Objects carry string-keyed fields sorted by the map's natural order, so
/// the serialized form is deterministic. Equality is structural.
pub type Datum = serde_json::Value;

/// The type name used in user-facing error messages.
pub fn datum_type_name(d: &Datum) -> &'static str {
    match d {
        Datum::Null => "NULL",
        Datum::Bool(_) => "BOOLEAN",
        Datum::Number(_) => "NUMBER",
        Datum::String(_) => "STRING",
        Datum::Array(_) => "ARRAY",
        Datum::Object(_) => "OBJECT",
    }
}

/// Stable compact printing, for error messages.
pub fn print_datum(d: &Datum) -> String {
    d.to_string()
}

/// Approximate heap footprint of a datum, for scratch accounting.
pub(crate) fn datum_scratch_size(d: &Datum) -> u64 {
    match d {
        Datum::Null | Datum::Bool(_) | Datum::Number(_) => 16,
        Datum::String(s) => 24 + s.len() as u64,
        Datum::Array(items) => 24 + items.iter().map(datum_scratch_size).sum::<u64>(),
        Datum::Object(fields) => {
            24 + fields
                .iter()
                .map(|(k, v)| 24 + k.len() as u64 + datum_scratch_size(v))
                .sum::<u64>()
        }
    }
}
