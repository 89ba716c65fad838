//! Store error kinds.

use thiserror::Error;

/// Errors surfaced by the persistent store.
///
/// The first five kinds are operational and map onto client-visible HTTP
/// statuses; everything else is internal. Query text never appears in
/// these messages.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient funds")]
    InsufficientFunds,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("transient storage failure")]
    Transient,

    #[error("migration error: {0}")]
    Migration(String),

    #[error("integrity error: {0}")]
    Integrity(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Whether a retry of the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DbError::Transient => true,
            DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _)) => {
                matches!(
                    e.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                )
            }
            _ => false,
        }
    }
}
