//! User queries.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{DbError, Result};
use crate::models::User;

/// New-user parameters. Exactly one of `password_hash` / `linking_key`
/// should be set; the auth layer enforces that before calling.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: String,
    pub username: Option<String>,
    pub password_hash: Option<String>,
    pub linking_key: Option<String>,
    pub display_name: String,
    pub created_at: u64,
}

pub trait UserQueries {
    /// Insert a user and its empty wallet in one transaction scope.
    fn create_user(&self, user: &NewUser) -> Result<User>;

    fn get_user(&self, id: &str) -> Result<Option<User>>;

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>>;

    fn get_user_by_linking_key(&self, linking_key: &str) -> Result<Option<User>>;

    fn update_display_name(&self, id: &str, display_name: &str, now: u64) -> Result<()>;

    fn update_lightning_address(&self, id: &str, address: Option<&str>, now: u64) -> Result<()>;
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password_hash: row.get(2)?,
        linking_key: row.get(3)?,
        display_name: row.get(4)?,
        lightning_address: row.get(5)?,
        created_at: row.get::<_, i64>(6)? as u64,
        updated_at: row.get::<_, i64>(7)? as u64,
    })
}

const USER_COLUMNS: &str = "id, username, password_hash, linking_key, display_name, \
                            lightning_address, created_at, updated_at";

impl UserQueries for Connection {
    fn create_user(&self, user: &NewUser) -> Result<User> {
        let inserted = self.execute(
            r#"
            INSERT OR IGNORE INTO users
                (id, username, password_hash, linking_key, display_name, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                user.id,
                user.username,
                user.password_hash,
                user.linking_key,
                user.display_name,
                user.created_at as i64,
            ],
        )?;
        if inserted == 0 {
            return Err(DbError::Conflict("user already exists".into()));
        }

        self.execute(
            "INSERT INTO wallets (user_id, balance_sats, updated_at) VALUES (?1, 0, ?2)",
            params![user.id, user.created_at as i64],
        )?;

        self.get_user(&user.id)?.ok_or(DbError::NotFound)
    }

    fn get_user(&self, id: &str) -> Result<Option<User>> {
        Ok(self
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                row_to_user,
            )
            .optional()?)
    }

    fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                row_to_user,
            )
            .optional()?)
    }

    fn get_user_by_linking_key(&self, linking_key: &str) -> Result<Option<User>> {
        Ok(self
            .query_row(
                &format!("SELECT {} FROM users WHERE linking_key = ?1", USER_COLUMNS),
                params![linking_key],
                row_to_user,
            )
            .optional()?)
    }

    fn update_display_name(&self, id: &str, display_name: &str, now: u64) -> Result<()> {
        let updated = self.execute(
            "UPDATE users SET display_name = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, display_name, now as i64],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    fn update_lightning_address(&self, id: &str, address: Option<&str>, now: u64) -> Result<()> {
        let updated = self.execute(
            "UPDATE users SET lightning_address = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, address, now as i64],
        )?;
        if updated == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }
}
