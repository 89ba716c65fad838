//! Webhook signature verification.
//!
//! The Lightning backend signs each delivery with HMAC-SHA256 over the
//! raw request body bytes. Verification must use the raw bytes as
//! received — re-serializing the JSON changes key order and breaks the
//! MAC. There is no bypass: a missing secret disables the endpoint
//! entirely (production startup refuses to run without one).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Accepted signature headers, in lookup order.
pub const SIGNATURE_HEADERS: [&str; 3] =
    ["x-lnbits-signature", "x-webhook-signature", "x-signature"];

/// Compute the hex HMAC-SHA256 of `body` under `secret`.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature over the raw body.
///
/// Constant-time: the hex signature is decoded and handed to the MAC's
/// own verifier, so mismatches are indistinguishable by timing. Missing,
/// undecodable, or wrong-length signatures all fail.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-webhook-secret";

    #[test]
    fn valid_signature_verifies() {
        let body = br#"{"payment_hash":"ab","paid":true}"#;
        let sig = sign_body(SECRET, body);
        assert!(verify_signature(SECRET, body, &sig));
    }

    #[test]
    fn body_mutation_breaks_signature() {
        let body = br#"{"payment_hash":"ab","paid":true}"#;
        let sig = sign_body(SECRET, body);
        let reordered = br#"{"paid":true,"payment_hash":"ab"}"#;
        assert!(!verify_signature(SECRET, reordered, &sig));
    }

    #[test]
    fn wrong_secret_or_garbage_fails() {
        let body = b"payload";
        let sig = sign_body(SECRET, body);
        assert!(!verify_signature("other-secret", body, &sig));
        assert!(!verify_signature(SECRET, body, "not-hex"));
        assert!(!verify_signature(SECRET, body, ""));
        assert!(!verify_signature(SECRET, body, &sig[..32]));
    }
}
