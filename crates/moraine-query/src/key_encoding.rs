//! Order-preserving byte encoding of datums.
//!
//! Secondary-index keys and grouped-aggregation keys both need a byte form
//! of a datum that (a) compares the way datums compare, (b) never collides
//! for distinct datums, and (c) is self-delimiting so more bytes can follow.
//!
//! # Encoding
//!
//! Each datum starts with a type tag; types sort
//! null < false < true < number < string < array < object:
//!
//! ```text
//! 0x01                              null
//! 0x02 / 0x03                       false / true
//! 0x04 [8 bytes]                    number, monotone f64 bits (big-endian)
//! 0x05 [escaped bytes] 0x00         string; 0x00 escapes to 0x00 0xFF
//! 0x06 [element...] 0x00            array, elements encoded recursively
//! 0x07 [key value ...] 0x00         object, fields in key order
//! ```
//!
//! Tags never use 0x00, so the terminators are unambiguous and a shorter
//! composite sorts before any extension of it.

use moraine_types::StoreKey;

use crate::datum::Datum;

const TAG_NULL: u8 = 0x01;
const TAG_FALSE: u8 = 0x02;
const TAG_TRUE: u8 = 0x03;
const TAG_NUMBER: u8 = 0x04;
const TAG_STRING: u8 = 0x05;
const TAG_ARRAY: u8 = 0x06;
const TAG_OBJECT: u8 = 0x07;

const TERMINATOR: u8 = 0x00;

/// Encodes a datum into its order-preserving byte form.
pub fn datum_key_bytes(d: &Datum) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    encode_into(d, &mut out);
    out
}

/// Encodes a secondary-index key for `(index_datum, primary_key)`.
///
/// Sorts by the index datum first; the primary key and its length byte keep
/// rows with equal index values distinct.
pub fn encode_secondary(index_datum: &Datum, primary_key: &StoreKey) -> StoreKey {
    let mut out = datum_key_bytes(index_datum);
    out.extend_from_slice(primary_key.as_bytes());
    out.push(primary_key.len() as u8);
    StoreKey::new(out)
}

fn encode_into(d: &Datum, out: &mut Vec<u8>) {
    match d {
        Datum::Null => out.push(TAG_NULL),
        Datum::Bool(false) => out.push(TAG_FALSE),
        Datum::Bool(true) => out.push(TAG_TRUE),
        Datum::Number(_) => {
            out.push(TAG_NUMBER);
            let v = d.as_f64().unwrap_or(0.0);
            out.extend_from_slice(&monotone_f64_bits(v).to_be_bytes());
        }
        Datum::String(s) => {
            out.push(TAG_STRING);
            encode_escaped(s.as_bytes(), out);
            out.push(TERMINATOR);
        }
        Datum::Array(items) => {
            out.push(TAG_ARRAY);
            for item in items {
                encode_into(item, out);
            }
            out.push(TERMINATOR);
        }
        Datum::Object(fields) => {
            out.push(TAG_OBJECT);
            for (k, v) in fields {
                out.push(TAG_STRING);
                encode_escaped(k.as_bytes(), out);
                out.push(TERMINATOR);
                encode_into(v, out);
            }
            out.push(TERMINATOR);
        }
    }
}

/// Escapes embedded zero bytes as `0x00 0xFF` so the terminator stays
/// unambiguous while preserving order.
fn encode_escaped(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == 0x00 {
            out.push(0xFF);
        }
    }
}

/// Maps f64 bits so that unsigned byte comparison matches numeric order:
/// negative values flip entirely, non-negative values flip the sign bit.
fn monotone_f64_bits(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits ^ (1 << 63)
    }
}
