//! Typed payloads stored in the cache.

use serde::{Deserialize, Serialize};

/// What a pending Lightning invoice will settle when paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    BuyIn,
    Deposit,
}

/// A payment hash bound to a pending user-facing action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceIntent {
    pub kind: IntentKind,
    pub user_id: String,
    /// Present for buy-ins only.
    pub tournament_id: Option<String>,
    pub amount_sats: i64,
    pub payment_request: String,
    pub payment_hash: String,
    pub created_at: u64,
}

/// Handle minted by start-attempt and consumed by exactly one submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveAttempt {
    pub user_id: String,
    pub entry_id: String,
    pub attempt_number: u8,
    pub started_at: u64,
}

/// Bearer session payload. The sliding TTL lives on the cache key; the
/// record carries timestamps for display and auditing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub user_id: String,
    pub created_at: u64,
    pub last_activity: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeStatus {
    Pending,
    Verified,
    Consumed,
}

/// LNURL-auth challenge state for one k1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LnurlChallenge {
    pub linking_key: Option<String>,
    pub status: ChallengeStatus,
    pub expires_at: u64,
}
