//! Password hashing.

use crate::{AuthError, Result};

/// Work factor. 12 keeps verification around 250ms on current hardware.
const BCRYPT_COST: u32 = 12;

pub fn hash_password(password: &str) -> Result<String> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|_| AuthError::Validation("Password could not be processed".into()))
}

/// Verify a password against a stored hash. Hash-format errors count as
/// a mismatch rather than leaking storage details.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn malformed_hash_is_mismatch() {
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
    }
}
