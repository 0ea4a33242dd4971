//! Store keys and key ranges.
//!
//! A [`StoreKey`] is an arbitrary byte string ordered lexicographically; it
//! is the unit of addressing in every B-tree of the table. A [`KeyRange`] is
//! the half-open interval `[left, right)` used by range scans, erases, and
//! backfill.

use std::fmt::{self, Debug, Display};

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Maximum key length in bytes.
///
/// Bounds the padding produced by [`StoreKey::decrement`] and keeps leaf
/// accounting predictable.
pub const MAX_STORE_KEY_LEN: usize = 250;

// ============================================================================
// StoreKey
// ============================================================================

/// Byte string used to order entries in a B-tree.
///
/// Keys compare lexicographically and the empty key sorts first. Primary
/// keys are usually printable text; secondary keys come out of the datum
/// encoder and are not. Nothing here assumes UTF-8.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct StoreKey(Bytes);

impl StoreKey {
    /// Wraps raw bytes as a key. The [`MAX_STORE_KEY_LEN`] ceiling is a
    /// debug-build check; encoders are responsible for staying under it.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let key = Self(data.into());
        debug_assert!(
            key.len() <= MAX_STORE_KEY_LEN,
            "store key of {} bytes exceeds the {MAX_STORE_KEY_LEN}-byte ceiling",
            key.len()
        );
        key
    }

    /// The minimum key: empty, below every stored entry.
    pub fn min() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The smallest key strictly greater than this one.
    ///
    /// Appends a zero byte while under the length limit; at the limit,
    /// increments with carry (dropping trailing 0xFF bytes first).
    pub fn successor(&self) -> StoreKey {
        if self.0.len() < MAX_STORE_KEY_LEN {
            let mut v = self.0.to_vec();
            v.push(0x00);
            return StoreKey::new(v);
        }
        let mut v = self.0.to_vec();
        while let Some(&last) = v.last() {
            if last < 0xFF {
                *v.last_mut().unwrap() = last + 1;
                return StoreKey::new(v);
            }
            v.pop();
        }
        // All bytes were 0xFF: no strict successor at this length; return
        // the maximal key unchanged.
        self.clone()
    }

    /// The largest key strictly smaller than this one, or `None` for the
    /// minimum key.
    ///
    /// A key ending in a zero byte shrinks by one byte; otherwise the last
    /// byte is decremented and the key is padded with 0xFF to the maximum
    /// length.
    pub fn decrement(&self) -> Option<StoreKey> {
        let mut v = self.0.to_vec();
        let last = *v.last()?;
        if last == 0x00 {
            v.pop();
        } else {
            *v.last_mut().unwrap() = last - 1;
            v.resize(MAX_STORE_KEY_LEN, 0xFF);
        }
        Some(StoreKey::new(v))
    }
}

// Keys render with ASCII escapes rather than a hex dump: error messages
// and log lines mostly show primary keys, which are text.

impl Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey(\"{}\")", self.0.escape_ascii())
    }
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

impl From<&str> for StoreKey {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for StoreKey {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

impl From<Vec<u8>> for StoreKey {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

// ============================================================================
// KeyRange
// ============================================================================

/// Half-open key interval `[left, right)`.
///
/// `right = None` means unbounded on the right.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyRange {
    /// Inclusive left bound.
    pub left: StoreKey,
    /// Exclusive right bound, or `None` for unbounded.
    pub right: Option<StoreKey>,
}

impl KeyRange {
    pub fn new(left: StoreKey, right: Option<StoreKey>) -> Self {
        debug_assert!(
            right.as_ref().is_none_or(|r| left <= *r),
            "inverted key range"
        );
        Self { left, right }
    }

    /// The range covering every key.
    pub fn all() -> Self {
        Self {
            left: StoreKey::min(),
            right: None,
        }
    }

    /// Everything at or after `left`.
    pub fn from_left(left: StoreKey) -> Self {
        Self { left, right: None }
    }

    pub fn contains(&self, key: &StoreKey) -> bool {
        *key >= self.left && self.right.as_ref().is_none_or(|r| key < r)
    }

    /// The overlap of two ranges, or `None` when they are disjoint.
    pub fn intersect(&self, other: &KeyRange) -> Option<KeyRange> {
        let left = self.left.clone().max(other.left.clone());
        let right = match (&self.right, &other.right) {
            (None, None) => None,
            (Some(r), None) | (None, Some(r)) => Some(r.clone()),
            (Some(a), Some(b)) => Some(a.clone().min(b.clone())),
        };
        if right.as_ref().is_some_and(|r| *r <= left) {
            return None;
        }
        Some(KeyRange { left, right })
    }

    pub fn is_superset(&self, other: &KeyRange) -> bool {
        if other.left < self.left {
            return false;
        }
        match (&self.right, &other.right) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some(r), Some(or)) => or <= r,
        }
    }
}

impl Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.right {
            Some(r) => write!(f, "[{}, {})", self.left, r),
            None => write!(f, "[{}, +inf)", self.left),
        }
    }
}
