//! Engine error taxonomy.
//!
//! Operational kinds carry user-visible messages and stable codes; the
//! transport layer maps them to HTTP statuses. Everything else is
//! internal and gets redacted behind a correlation id before leaving the
//! process.

use thiserror::Error;

use arena_cache::CacheError;
use arena_db::DbError;
use arena_lightning::LightningError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad input shape or out-of-range value.
    #[error("{0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found")]
    NotFound,

    /// No open tournament right now.
    #[error("no open tournament")]
    NoTournament,

    /// The caller has no entry in the current tournament.
    #[error("no entry for this tournament")]
    NoEntry,

    /// The attempt cap is exhausted.
    #[error("maximum attempts reached")]
    MaxAttempts,

    /// Attempt handle missing, expired, already used, or owned by
    /// someone else.
    #[error("attempt is invalid or already used")]
    InvalidAttempt,

    /// Wallet underflow; carries the snapshot for the response body.
    #[error("insufficient balance")]
    InsufficientBalance {
        balance_sats: i64,
        required_sats: i64,
    },

    /// The anti-cheat gate rejected the submission.
    #[error("score failed validation")]
    ScoreRejected { reasons: Vec<String> },

    /// The caller already holds an entry in this tournament.
    #[error("already entered in this tournament")]
    DuplicateEntry,

    /// Ownership mismatch (someone else's invoice or attempt).
    #[error("forbidden")]
    Forbidden,

    /// Webhook signature missing or wrong.
    #[error("invalid signature")]
    InvalidSignature,

    #[error(transparent)]
    Lightning(#[from] LightningError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Invariant violation or unexpected state; details stay server-side.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
