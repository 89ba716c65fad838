//! Bearer-token sessions.
//!
//! Tokens are 256 bits of OS randomness, hex-encoded, stored in the
//! ephemeral cache under `session:<token>` with a sliding TTL. Token
//! format is validated on every read so malformed input never reaches
//! the cache key space.

use std::sync::Arc;
use std::time::Duration;

use arena_cache::records::SessionRecord;
use arena_cache::{keys, Cache};
use arena_common::{session_token, unix_now};

use crate::Result;

pub struct SessionManager {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl SessionManager {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self {
            cache,
            ttl: keys::ttl::SESSION,
        }
    }

    pub fn with_ttl(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Mint a session for a user and return the bearer token.
    pub fn create(&self, user_id: &str) -> Result<String> {
        let token = session_token();
        let now = unix_now();
        let record = SessionRecord {
            user_id: user_id.to_string(),
            created_at: now,
            last_activity: now,
        };
        self.cache
            .set(&keys::session(&token), &arena_cache::encode(&record)?, self.ttl)?;
        Ok(token)
    }

    /// Look up a session and extend its TTL.
    pub fn get(&self, token: &str) -> Result<Option<SessionRecord>> {
        if !is_token_shaped(token) {
            return Ok(None);
        }
        let key = keys::session(token);
        let Some(mut record) = arena_cache::decode::<SessionRecord>(self.cache.get(&key)?)? else {
            return Ok(None);
        };

        record.last_activity = unix_now();
        self.cache
            .set(&key, &arena_cache::encode(&record)?, self.ttl)?;
        Ok(Some(record))
    }

    /// Destroy one session; true when it existed.
    pub fn destroy(&self, token: &str) -> Result<bool> {
        if !is_token_shaped(token) {
            return Ok(false);
        }
        Ok(self.cache.del(&keys::session(token))?)
    }

    /// Destroy every session belonging to a user (whitelist revocation,
    /// logout-all). Returns how many were destroyed.
    pub fn destroy_all_for_user(&self, user_id: &str) -> Result<usize> {
        let mut destroyed = 0;
        for key in self.cache.scan_prefix(keys::SESSION_PREFIX)? {
            let record: Option<SessionRecord> = arena_cache::decode(self.cache.get(&key)?)?;
            if let Some(record) = record {
                if record.user_id == user_id && self.cache.del(&key)? {
                    destroyed += 1;
                }
            }
        }
        Ok(destroyed)
    }
}

fn is_token_shaped(token: &str) -> bool {
    token.len() == 64 && token.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
