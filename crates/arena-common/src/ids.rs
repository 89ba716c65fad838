//! Random identifier generation.
//!
//! All identifiers are hex-encoded cryptographic randomness from the OS
//! generator. Sizes differ by purpose: session tokens carry 256 bits,
//! attempt handles 128, entity ids 64, correlation ids 64.

use rand::RngCore;
use sha2::{Digest, Sha256};

fn random_hex(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// 64-bit entity id (16 hex chars) for database rows.
pub fn entity_id() -> String {
    random_hex(8)
}

/// 256-bit session token, 64 hex chars.
pub fn session_token() -> String {
    random_hex(32)
}

/// 128-bit attempt handle, 32 hex chars.
pub fn attempt_id() -> String {
    random_hex(16)
}

/// 8-byte correlation id attached to redacted error responses.
pub fn correlation_id() -> String {
    random_hex(8)
}

/// Opaque per-submission correlator for anti-cheat diagnostics.
///
/// Derived from the user id and a timestamp so log lines from one
/// submission correlate without exposing the user id itself.
pub fn submission_correlator(user_id: &str, unix_ts: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(unix_ts.to_be_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_sizes() {
        assert_eq!(session_token().len(), 64);
        assert_eq!(attempt_id().len(), 32);
        assert_eq!(entity_id().len(), 16);
        assert_eq!(correlation_id().len(), 16);
    }

    #[test]
    fn tokens_are_unique() {
        assert_ne!(session_token(), session_token());
        assert_ne!(attempt_id(), attempt_id());
    }

    #[test]
    fn correlator_is_stable_and_short() {
        let a = submission_correlator("user-1", 1_700_000_000);
        let b = submission_correlator("user-1", 1_700_000_000);
        let c = submission_correlator("user-2", 1_700_000_000);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 12);
        assert!(!a.contains("user"));
    }
}
