//! Compound timer keys.
//!
//! A [`SequenceId`] packs an expiry timestamp (Unix nanoseconds) and a
//! tie-break sequence number into one signed 64-bit scalar so the persisted
//! timer stream can be range-scanned by a single clustering key:
//!
//! ```text
//!  63   62 ......................... 26   25 ............. 0
//! [ 0 ][ expiry & TIMESTAMP_BITMASK   ][ seq & SEQ_NUM_BITMASK ]
//! ```
//!
//! The low 26 bits of the expiry are dropped, so timestamps are compared in
//! buckets of 2^26 ns (about 67 ms). Within a bucket the sequence number breaks
//! ties. Neither field is range-checked: callers keep `expiry >= 0` and
//! `seq <= SEQ_NUM_MAX`; the shard's sequence blocks are what keep the
//! tie-break unique.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of the tie-break field.
pub const SEQ_NUM_BITS: u32 = 26;

/// Mask selecting the tie-break field.
pub const SEQ_NUM_BITMASK: i64 = (1_i64 << SEQ_NUM_BITS) - 1;

/// Mask selecting the timestamp field (sign bit excluded).
pub const TIMESTAMP_BITMASK: i64 = i64::MAX & !SEQ_NUM_BITMASK;

/// Largest tie-break value that survives [`SequenceId::construct`] unchanged.
pub const SEQ_NUM_MAX: i64 = i64::MAX & SEQ_NUM_BITMASK;

/// Timer key: expiry in the high bits, tie-break sequence in the low bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SequenceId(i64);

impl SequenceId {
    /// Lower bound for a full scan; sorts below every constructed key.
    pub const MIN: Self = Self(-1);

    /// Upper bound for a full scan.
    pub const MAX: Self = Self(i64::MAX);

    /// Wrap an already-encoded key, e.g. one read back from storage.
    #[must_use]
    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Encoded scalar value.
    #[must_use]
    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Pack `expiry` (Unix nanoseconds) and `seq` into one key.
    #[must_use]
    pub const fn construct(expiry: i64, seq: i64) -> Self {
        Self((expiry & TIMESTAMP_BITMASK) | (seq & SEQ_NUM_BITMASK))
    }

    /// Pack an expiry instant and `seq` into one key.
    ///
    /// Instants past the nanosecond range of `i64` (year 2262) saturate.
    #[must_use]
    pub fn from_time(expiry: DateTime<Utc>, seq: i64) -> Self {
        Self::construct(expiry.timestamp_nanos_opt().unwrap_or(i64::MAX), seq)
    }

    /// Split the key back into `(expiry, seq)`.
    ///
    /// The expiry comes back truncated to its bucket.
    #[must_use]
    pub const fn deconstruct(self) -> (i64, i64) {
        (self.0 & TIMESTAMP_BITMASK, self.0 & SEQ_NUM_BITMASK)
    }

    /// Expiry field in Unix nanoseconds.
    #[must_use]
    pub const fn expiry(self) -> i64 {
        self.deconstruct().0
    }

    /// Tie-break field.
    #[must_use]
    pub const fn seq(self) -> i64 {
        self.deconstruct().1
    }

    /// Expiry field as a UTC instant.
    #[must_use]
    pub fn expiry_time(self) -> DateTime<Utc> {
        DateTime::from_timestamp_nanos(self.expiry())
    }
}

impl From<SequenceId> for i64 {
    fn from(id: SequenceId) -> Self {
        id.0
    }
}

impl fmt::Display for SequenceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (expiry, seq) = self.deconstruct();
        write!(
            f,
            "SequenceId={}({expiry:x} {seq:x}) {}",
            self.0,
            self.expiry_time().to_rfc3339()
        )
    }
}
