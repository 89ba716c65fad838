//! Row types for the persistent store.

use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// A registered player.
///
/// Authentication material is either a password hash (with a username) or
/// a Lightning linking key; exactly one of the two is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub linking_key: Option<String>,
    pub display_name: String,
    pub lightning_address: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: String,
    pub balance_sats: i64,
    pub updated_at: u64,
}

/// Journal entry kind. Closed set; the schema enforces it with a CHECK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Deposit,
    BuyIn,
    Payout,
    Refund,
}

impl TxKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Deposit => "deposit",
            TxKind::BuyIn => "buy_in",
            TxKind::Payout => "payout",
            TxKind::Refund => "refund",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "deposit" => Ok(TxKind::Deposit),
            "buy_in" => Ok(TxKind::BuyIn),
            "payout" => Ok(TxKind::Payout),
            "refund" => Ok(TxKind::Refund),
            other => Err(DbError::Integrity(format!(
                "unknown transaction kind: {}",
                other
            ))),
        }
    }
}

/// Append-only journal row. Never updated, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: i64,
    pub user_id: String,
    pub kind: TxKind,
    pub amount_sats: i64,
    pub description: String,
    pub reference: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TournamentStatus {
    Open,
    Completed,
}

impl TournamentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentStatus::Open => "open",
            TournamentStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "open" => Ok(TournamentStatus::Open),
            "completed" => Ok(TournamentStatus::Completed),
            other => Err(DbError::Integrity(format!(
                "unknown tournament status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: String,
    pub date: String,
    pub buy_in_sats: i64,
    pub prize_pool_sats: i64,
    pub status: TournamentStatus,
    pub start_time: u64,
    pub end_time: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: String,
    pub tournament_id: String,
    pub user_id: String,
    pub attempts_used: i64,
    pub max_attempts: i64,
    pub attempts_scored: i64,
    pub attempt1_score: Option<i64>,
    pub attempt2_score: Option<i64>,
    pub attempt3_score: Option<i64>,
    pub best_score: i64,
    pub created_at: u64,
}

impl Entry {
    /// Recorded score for attempt `k` (1-based), if any.
    pub fn attempt_score(&self, k: u8) -> Option<i64> {
        match k {
            1 => self.attempt1_score,
            2 => self.attempt2_score,
            3 => self.attempt3_score,
            _ => None,
        }
    }

    pub fn attempts_remaining(&self) -> i64 {
        (self.max_attempts - self.attempts_used).max(0)
    }
}

/// Immutable audit row per accepted submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub entry_id: String,
    pub score: i64,
    pub level: i64,
    pub duration_ms: i64,
    pub input_hash: Option<String>,
    pub verified: bool,
    pub created_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Paid,
}

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Result<Self, DbError> {
        match s {
            "pending" => Ok(PayoutStatus::Pending),
            "paid" => Ok(PayoutStatus::Paid),
            other => Err(DbError::Integrity(format!(
                "unknown payout status: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    pub id: String,
    pub tournament_id: String,
    pub user_id: String,
    pub place: i64,
    pub amount_sats: i64,
    pub destination: String,
    pub status: PayoutStatus,
    pub payment_hash: Option<String>,
    pub paid_at: Option<u64>,
    pub attempt_count: i64,
    pub last_attempt_at: Option<u64>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub linking_key: String,
    pub display_name: Option<String>,
    pub is_admin: bool,
    pub approved_by: String,
    pub approved_at: u64,
}

/// Leaderboard row: entry joined with the player's display name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub user_id: String,
    pub display_name: String,
    pub best_score: i64,
}

/// Winner row used by the payout driver: leaderboard joined with the
/// payout destination.
#[derive(Debug, Clone)]
pub struct WinnerRow {
    pub user_id: String,
    pub display_name: String,
    pub best_score: i64,
    pub lightning_address: Option<String>,
}
