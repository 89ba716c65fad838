//! Cache key construction and TTL policy.
//!
//! Every cache consumer builds keys through these helpers so the key
//! space stays enumerable (prefix scans rely on it).

use std::time::Duration;

/// Invoice intent for a tournament buy-in, keyed by payment hash.
pub fn buy_in_intent(payment_hash: &str) -> String {
    format!("invoice:{}", payment_hash)
}

/// Invoice intent for a wallet deposit, keyed by payment hash.
pub fn deposit_intent(payment_hash: &str) -> String {
    format!("deposit:{}", payment_hash)
}

/// Reverse index: in-flight buy-in for a user within a tournament.
pub fn buy_in_index(user_id: &str, tournament_id: &str) -> String {
    format!("invoice-idx:{}:{}", tournament_id, user_id)
}

/// Reverse index: in-flight deposit for a user.
pub fn deposit_index(user_id: &str) -> String {
    format!("deposit-idx:{}", user_id)
}

/// Webhook idempotency marker.
pub fn webhook_marker(payment_hash: &str) -> String {
    format!("webhook:{}", payment_hash)
}

/// Active attempt handle.
pub fn attempt(attempt_id: &str) -> String {
    format!("attempt:{}", attempt_id)
}

/// Bearer session.
pub fn session(token: &str) -> String {
    format!("session:{}", token)
}

/// Prefix for scanning all sessions.
pub const SESSION_PREFIX: &str = "session:";

/// Rate-limit counter for a scope (e.g. "auth") and client key.
pub fn rate(scope: &str, client: &str) -> String {
    format!("rate:{}:{}", scope, client)
}

/// LNURL-auth challenge, keyed by k1.
pub fn lnurl_challenge(k1: &str) -> String {
    format!("lnurl-k1:{}", k1)
}

/// TTLs for each record family.
pub mod ttl {
    use super::Duration;

    pub const INVOICE_INTENT: Duration = Duration::from_secs(10 * 60);
    pub const WEBHOOK_MARKER: Duration = Duration::from_secs(24 * 60 * 60);
    pub const ACTIVE_ATTEMPT: Duration = Duration::from_secs(60 * 60);
    pub const SESSION: Duration = Duration::from_secs(24 * 60 * 60);
    pub const LNURL_CHALLENGE: Duration = Duration::from_secs(5 * 60);
}
