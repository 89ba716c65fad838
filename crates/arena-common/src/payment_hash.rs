//! Lightning payment-hash normalization.
//!
//! Payment hashes are the global idempotency key of the payment pipeline,
//! so every inbound representation (webhook body, status-poll path
//! segment, backend response) is funneled through one normalizer before
//! it touches cache keys or database references.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PaymentHashError {
    #[error("payment hash must be 64 hex characters")]
    Malformed,
}

/// Normalize a payment hash: trim, lowercase, strip dashes, then require
/// exactly 64 lowercase hex characters.
pub fn normalize_payment_hash(raw: &str) -> Result<String, PaymentHashError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| *c != '-')
        .flat_map(|c| c.to_lowercase())
        .collect();

    if cleaned.len() != 64 || !cleaned.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(PaymentHashError::Malformed);
    }
    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HASH: &str = "a3f1c2d4e5b6978812345678901234567890abcdefabcdefabcdefabcdefabcd";

    #[test]
    fn accepts_canonical() {
        assert_eq!(normalize_payment_hash(HASH).unwrap(), HASH);
    }

    #[test]
    fn normalizes_case_whitespace_and_dashes() {
        let mixed = format!("  {}  ", HASH.to_uppercase());
        assert_eq!(normalize_payment_hash(&mixed).unwrap(), HASH);

        let dashed = format!("{}-{}", &HASH[..32], &HASH[32..]);
        assert_eq!(normalize_payment_hash(&dashed).unwrap(), HASH);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(normalize_payment_hash("").is_err());
        assert!(normalize_payment_hash(&HASH[..63]).is_err());
        assert!(normalize_payment_hash(&format!("{}g", &HASH[..63])).is_err());
        assert!(normalize_payment_hash(&format!("{}00", HASH)).is_err());
    }
}
