//! LNURL-auth whitelist queries.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::WhitelistEntry;

pub trait WhitelistQueries {
    /// Insert or replace a whitelist entry.
    fn whitelist_add(&self, entry: &WhitelistEntry) -> Result<()>;

    fn whitelist_get(&self, linking_key: &str) -> Result<Option<WhitelistEntry>>;

    /// Remove an entry; returns whether it existed.
    fn whitelist_remove(&self, linking_key: &str) -> Result<bool>;

    fn whitelist_list(&self) -> Result<Vec<WhitelistEntry>>;

    /// Promote an existing entry to admin; returns whether it existed.
    fn whitelist_set_admin(&self, linking_key: &str, is_admin: bool) -> Result<bool>;
}

impl WhitelistQueries for Connection {
    fn whitelist_add(&self, entry: &WhitelistEntry) -> Result<()> {
        self.execute(
            r#"
            INSERT OR REPLACE INTO whitelist
                (linking_key, display_name, is_admin, approved_by, approved_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                entry.linking_key,
                entry.display_name,
                entry.is_admin as i64,
                entry.approved_by,
                entry.approved_at as i64,
            ],
        )?;
        Ok(())
    }

    fn whitelist_get(&self, linking_key: &str) -> Result<Option<WhitelistEntry>> {
        Ok(self
            .query_row(
                r#"
                SELECT linking_key, display_name, is_admin, approved_by, approved_at
                FROM whitelist WHERE linking_key = ?1
                "#,
                params![linking_key],
                |row| {
                    Ok(WhitelistEntry {
                        linking_key: row.get(0)?,
                        display_name: row.get(1)?,
                        is_admin: row.get::<_, i64>(2)? != 0,
                        approved_by: row.get(3)?,
                        approved_at: row.get::<_, i64>(4)? as u64,
                    })
                },
            )
            .optional()?)
    }

    fn whitelist_remove(&self, linking_key: &str) -> Result<bool> {
        let removed = self.execute(
            "DELETE FROM whitelist WHERE linking_key = ?1",
            params![linking_key],
        )?;
        Ok(removed == 1)
    }

    fn whitelist_list(&self) -> Result<Vec<WhitelistEntry>> {
        let mut stmt = self.prepare(
            r#"
            SELECT linking_key, display_name, is_admin, approved_by, approved_at
            FROM whitelist ORDER BY approved_at ASC
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(WhitelistEntry {
                linking_key: row.get(0)?,
                display_name: row.get(1)?,
                is_admin: row.get::<_, i64>(2)? != 0,
                approved_by: row.get(3)?,
                approved_at: row.get::<_, i64>(4)? as u64,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    fn whitelist_set_admin(&self, linking_key: &str, is_admin: bool) -> Result<bool> {
        let updated = self.execute(
            "UPDATE whitelist SET is_admin = ?2 WHERE linking_key = ?1",
            params![linking_key, is_admin as i64],
        )?;
        Ok(updated == 1)
    }
}
