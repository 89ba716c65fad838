//! Username/password registration and login.

use std::sync::Arc;

use arena_common::{entity_id, unix_now};
use arena_db::queries::users::NewUser;
use arena_db::{Database, DbError, User, UserQueries};

use crate::password::{hash_password, verify_password};
use crate::sanitize::{sanitize_display_name, validate_password, validate_username};
use crate::session::SessionManager;
use crate::{AuthError, Result};

pub struct AccountService {
    db: Database,
    sessions: Arc<SessionManager>,
}

impl AccountService {
    pub fn new(db: Database, sessions: Arc<SessionManager>) -> Self {
        Self { db, sessions }
    }

    /// Create a user and mint a session.
    pub fn register(
        &self,
        username: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<(User, String)> {
        validate_username(username)?;
        validate_password(password)?;
        let display_name = match display_name {
            Some(name) => sanitize_display_name(name)?,
            None => sanitize_display_name(username)?,
        };

        let password_hash = hash_password(password)?;
        let user = self
            .db
            .transaction(|conn| {
                conn.create_user(&NewUser {
                    id: entity_id(),
                    username: Some(username.to_string()),
                    password_hash: Some(password_hash.clone()),
                    linking_key: None,
                    display_name: display_name.clone(),
                    created_at: unix_now(),
                })
            })
            .map_err(|e| match e {
                DbError::Conflict(_) => AuthError::Validation("Username is taken".into()),
                other => AuthError::Db(other),
            })?;

        let token = self.sessions.create(&user.id)?;
        tracing::info!(user = %user_prefix(&user.id), "User registered");
        Ok((user, token))
    }

    /// Verify credentials and mint a session.
    pub fn login(&self, username: &str, password: &str) -> Result<(User, String)> {
        let user = self
            .db
            .with_conn(|conn| conn.get_user_by_username(username))?
            .ok_or(AuthError::InvalidCredentials)?;

        let hash = user
            .password_hash
            .as_deref()
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(password, hash) {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.sessions.create(&user.id)?;
        Ok((user, token))
    }

    pub fn logout(&self, token: &str) -> Result<bool> {
        Ok(self.sessions.destroy(token)?)
    }

    pub fn logout_all(&self, user_id: &str) -> Result<usize> {
        self.sessions.destroy_all_for_user(user_id)
    }
}

/// Short non-identifying prefix for log lines.
pub fn user_prefix(user_id: &str) -> &str {
    &user_id[..user_id.len().min(6)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_cache::MemoryCache;

    fn service() -> AccountService {
        let db = Database::open_in_memory().unwrap();
        let sessions = Arc::new(SessionManager::new(Arc::new(MemoryCache::new())));
        AccountService::new(db, sessions)
    }

    #[test]
    fn register_then_login() {
        let accounts = service();
        let (user, token) = accounts
            .register("alice", "hunter2hunter2", Some("Alice"))
            .unwrap();
        assert_eq!(user.display_name, "Alice");
        assert_eq!(token.len(), 64);

        let (user2, _) = accounts.login("alice", "hunter2hunter2").unwrap();
        assert_eq!(user.id, user2.id);
    }

    #[test]
    fn login_failures_are_uniform() {
        let accounts = service();
        accounts
            .register("alice", "hunter2hunter2", None)
            .unwrap();

        let wrong_pass = accounts.login("alice", "wrongwrong").unwrap_err();
        let wrong_user = accounts.login("nobody", "hunter2hunter2").unwrap_err();
        assert_eq!(wrong_pass.to_string(), wrong_user.to_string());
    }

    #[test]
    fn duplicate_username_rejected() {
        let accounts = service();
        accounts
            .register("alice", "hunter2hunter2", None)
            .unwrap();
        let err = accounts
            .register("alice", "otherpassword", None)
            .unwrap_err();
        assert!(matches!(err, AuthError::Validation(_)));
    }

    #[test]
    fn invalid_inputs_rejected() {
        let accounts = service();
        assert!(accounts.register("Al", "hunter2hunter2", None).is_err());
        assert!(accounts.register("alice", "short", None).is_err());
    }

    #[test]
    fn logout_destroys_session() {
        let accounts = service();
        let (_, token) = accounts
            .register("alice", "hunter2hunter2", None)
            .unwrap();
        assert!(accounts.logout(&token).unwrap());
        assert!(!accounts.logout(&token).unwrap());
    }
}
