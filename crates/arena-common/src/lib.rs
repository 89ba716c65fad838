//! Shared primitives for sats-arena.
//!
//! Small, dependency-light building blocks used by every other crate:
//! random identifiers, Lightning payment-hash normalization, constant-time
//! comparison, correlation ids for redacted logging, and UTC day keys for
//! the daily tournament cycle.

pub mod ids;
pub mod payment_hash;
pub mod timeutil;

pub use ids::{attempt_id, correlation_id, entity_id, session_token, submission_correlator};
pub use payment_hash::{normalize_payment_hash, PaymentHashError};
pub use timeutil::{day_key, unix_now, DayKey};

use subtle::ConstantTimeEq;

/// Compare two byte strings in constant time.
///
/// Length is checked first; unequal lengths return false immediately,
/// equal lengths are compared without data-dependent branching.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
        assert!(!constant_time_eq(b"abcdef", b"abcdeg"));
        assert!(!constant_time_eq(b"abc", b"abcdef"));
        assert!(constant_time_eq(b"", b""));
    }
}
