//! SQLite persistence for sats-arena.
//!
//! The store exposes typed operations on users, wallets, tournaments,
//! entries, payouts and the whitelist through per-entity query traits
//! implemented on [`rusqlite::Connection`]. The [`Database`] handle owns
//! the connection behind a mutex (single-writer) and provides a
//! closure-based transaction helper; a lockfile prevents a second
//! process from opening the same database for writing.

pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod schema;

pub use error::{DbError, Result};
pub use models::*;
pub use queries::entries::EntryQueries;
pub use queries::payouts::PayoutQueries;
pub use queries::tournaments::TournamentQueries;
pub use queries::users::UserQueries;
pub use queries::wallets::WalletQueries;
pub use queries::whitelist::WhitelistQueries;

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

/// Shared handle to the SQLite database.
///
/// Cloning is cheap; all clones share one connection. SQLite serializes
/// writers anyway, so a single guarded connection keeps the guarded
/// single-row updates (balance, attempt counter, prize pool) atomic
/// without further coordination.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    _lock: Option<Arc<File>>,
}

impl Database {
    /// Open (and initialize or migrate) a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let lock = Self::acquire_lock(path)?;

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "busy_timeout", 5_000)?;

        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            _lock: Some(Arc::new(lock)),
        })
    }

    /// Open an in-memory database. Used by tests and dev tooling.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            _lock: None,
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        let fresh: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get(0),
        )?;
        if fresh == 0 {
            migrations::initialize_schema(conn)?;
        } else {
            conn.execute_batch(schema::CREATE_SCHEMA)?;
            migrations::run_migrations(conn)?;
        }
        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        use fs2::FileExt;

        let lock_path = path.with_extension("lock");
        if let Some(parent) = lock_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| DbError::Integrity(format!("cannot create db directory: {}", e)))?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&lock_path)
            .map_err(|e| DbError::Integrity(format!("cannot open lockfile: {}", e)))?;
        file.try_lock_exclusive().map_err(|_| {
            DbError::Conflict(format!("database is locked ({})", lock_path.display()))
        })?;
        Ok(file)
    }

    /// Run a read or single-statement write against the connection.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Run `f` inside a transaction; commit on Ok, roll back on Err.
    pub fn transaction<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                // Drop rolls the transaction back.
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_in_memory_initializes_schema() {
        let db = Database::open_in_memory().unwrap();
        let version = db
            .with_conn(|conn| migrations::get_schema_version(conn))
            .unwrap();
        assert_eq!(version, migrations::CURRENT_VERSION);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let result: Result<()> = db.transaction(|conn| {
            conn.execute(
                "INSERT INTO whitelist (linking_key, is_admin, approved_by, approved_at) \
                 VALUES ('probe', 0, 'test', 0)",
                [],
            )?;
            Err(DbError::Transient)
        });
        assert!(result.is_err());

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM whitelist WHERE linking_key = 'probe'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 0);
    }
}
