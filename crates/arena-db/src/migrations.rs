//! Database schema migrations.
//!
//! Forward-only: each migration upgrades the schema by one version inside
//! a transaction. Downgrades are not supported.

use crate::{DbError, Result};
use rusqlite::Connection;
use tracing::info;

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

struct Migration {
    from_version: i32,
    to_version: i32,
    upgrade_sql: &'static str,
    description: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    from_version: 1,
    to_version: 2,
    upgrade_sql: r#"
        CREATE TABLE IF NOT EXISTS whitelist (
            linking_key TEXT PRIMARY KEY,
            display_name TEXT,
            is_admin INTEGER NOT NULL DEFAULT 0,
            approved_by TEXT NOT NULL,
            approved_at INTEGER NOT NULL
        );
    "#,
    description: "Add LNURL-auth whitelist table",
}];

/// Get the current schema version. A database with no version row is
/// treated as version 1 (the initial schema).
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result: std::result::Result<i32, _> =
        conn.query_row("SELECT version FROM schema_version WHERE id = 0", [], |row| {
            row.get(0)
        });

    match result {
        Ok(version) => {
            if version < 1 {
                return Err(DbError::Migration(format!(
                    "Invalid schema version: {}",
                    version
                )));
            }
            Ok(version)
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(1),
        Err(e) => Err(e.into()),
    }
}

/// Record the schema version.
pub fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version) VALUES (0, ?1)",
        [version],
    )?;
    Ok(())
}

/// Run all necessary migrations to bring the database up to date.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let mut current_version = get_schema_version(conn)?;

    if current_version == CURRENT_VERSION {
        return Ok(());
    }

    if current_version > CURRENT_VERSION {
        return Err(DbError::Migration(format!(
            "Database version {} is newer than supported version {}",
            current_version, CURRENT_VERSION
        )));
    }

    info!(
        from = current_version,
        to = CURRENT_VERSION,
        "Migrating database schema"
    );

    while current_version < CURRENT_VERSION {
        let migration = MIGRATIONS
            .iter()
            .find(|m| m.from_version == current_version)
            .ok_or_else(|| {
                DbError::Migration(format!("No migration found from version {}", current_version))
            })?;

        info!(
            from = migration.from_version,
            to = migration.to_version,
            description = migration.description,
            "Applying migration"
        );

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.upgrade_sql)?;
        set_schema_version(&tx, migration.to_version)?;
        tx.commit()?;

        current_version = migration.to_version;
    }

    info!(version = CURRENT_VERSION, "Migrations complete");
    Ok(())
}

/// Initialize a fresh database with the current schema.
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(crate::schema::CREATE_SCHEMA)?;
    set_schema_version(conn, CURRENT_VERSION)?;
    info!(version = CURRENT_VERSION, "Initialized database schema");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_test_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(crate::schema::CREATE_SCHEMA).unwrap();
        conn
    }

    #[test]
    fn test_get_schema_version_default() {
        let conn = setup_test_db();
        assert_eq!(get_schema_version(&conn).unwrap(), 1);
    }

    #[test]
    fn test_set_and_get_schema_version() {
        let conn = setup_test_db();
        set_schema_version(&conn, CURRENT_VERSION).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_run_migrations_from_v1() {
        let conn = setup_test_db();
        run_migrations(&conn).unwrap();
        assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_VERSION);
        conn.query_row("SELECT COUNT(*) FROM whitelist", [], |row| {
            row.get::<_, i64>(0)
        })
        .unwrap();
    }
}
