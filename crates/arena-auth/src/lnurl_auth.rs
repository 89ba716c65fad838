//! LNURL-auth challenge flow.
//!
//! A `k1` challenge is minted and presented (bech32-encoded) as a QR
//! code. The wallet signs the raw k1 bytes with its derived linking key
//! and posts `{k1, sig, key}`. Verification checks the secp256k1
//! signature, requires the linking key to be whitelisted, and marks the
//! challenge verified; a follow-up complete call consumes the challenge
//! (single-use, claimed via cache delete) and mints a session.

use std::sync::Arc;

use rand::RngCore;
use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};

use arena_cache::records::{ChallengeStatus, LnurlChallenge};
use arena_cache::{keys, Cache};
use arena_common::{constant_time_eq, entity_id, unix_now};
use arena_db::queries::users::NewUser;
use arena_db::{Database, User, UserQueries, WhitelistEntry, WhitelistQueries};

use crate::sanitize::{sanitize_display_name, validate_linking_key};
use crate::session::SessionManager;
use crate::{AuthError, Result};

pub struct LnurlAuthService {
    db: Database,
    cache: Arc<dyn Cache>,
    sessions: Arc<SessionManager>,
}

impl LnurlAuthService {
    pub fn new(db: Database, cache: Arc<dyn Cache>, sessions: Arc<SessionManager>) -> Self {
        Self { db, cache, sessions }
    }

    /// Mint a pending challenge and return its k1 (64 hex).
    pub fn create_challenge(&self) -> Result<String> {
        let mut k1 = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut k1);
        let k1_hex = hex::encode(k1);

        let challenge = LnurlChallenge {
            linking_key: None,
            status: ChallengeStatus::Pending,
            expires_at: unix_now() + keys::ttl::LNURL_CHALLENGE.as_secs(),
        };
        self.cache.set(
            &keys::lnurl_challenge(&k1_hex),
            &arena_cache::encode(&challenge)?,
            keys::ttl::LNURL_CHALLENGE,
        )?;
        Ok(k1_hex)
    }

    /// Wallet callback: verify the signature over k1 and whitelist
    /// membership, then mark the challenge verified.
    pub fn verify(&self, k1_hex: &str, sig_hex: &str, key_hex: &str) -> Result<()> {
        let k1 = decode_k1(k1_hex)?;
        validate_linking_key(key_hex)?;

        let cache_key = keys::lnurl_challenge(k1_hex);
        let challenge: LnurlChallenge = arena_cache::decode(self.cache.get(&cache_key)?)?
            .ok_or(AuthError::ChallengeInvalid)?;
        if challenge.status != ChallengeStatus::Pending || challenge.expires_at <= unix_now() {
            return Err(AuthError::ChallengeInvalid);
        }

        verify_k1_signature(&k1, sig_hex, key_hex)?;

        if self
            .db
            .with_conn(|conn| conn.whitelist_get(key_hex))?
            .is_none()
        {
            tracing::warn!("LNURL-auth attempt with non-whitelisted key");
            return Err(AuthError::NotWhitelisted);
        }

        let remaining = self
            .cache
            .ttl_remaining(&cache_key)?
            .unwrap_or(keys::ttl::LNURL_CHALLENGE);
        let verified = LnurlChallenge {
            linking_key: Some(key_hex.to_string()),
            status: ChallengeStatus::Verified,
            expires_at: challenge.expires_at,
        };
        self.cache
            .set(&cache_key, &arena_cache::encode(&verified)?, remaining)?;
        Ok(())
    }

    /// Poll a challenge's state without consuming it.
    pub fn status(&self, k1_hex: &str) -> Result<ChallengeStatus> {
        decode_k1(k1_hex)?;
        let challenge: LnurlChallenge =
            arena_cache::decode(self.cache.get(&keys::lnurl_challenge(k1_hex))?)?
                .ok_or(AuthError::ChallengeInvalid)?;
        Ok(challenge.status)
    }

    /// Consume a verified challenge and mint a session for the linked
    /// user (created on first login).
    pub fn complete(&self, k1_hex: &str) -> Result<(User, String)> {
        decode_k1(k1_hex)?;
        let cache_key = keys::lnurl_challenge(k1_hex);
        let challenge: LnurlChallenge = arena_cache::decode(self.cache.get(&cache_key)?)?
            .ok_or(AuthError::ChallengeInvalid)?;
        if challenge.status != ChallengeStatus::Verified {
            return Err(AuthError::ChallengeInvalid);
        }
        let linking_key = challenge.linking_key.ok_or(AuthError::ChallengeInvalid)?;

        // Single-use: whoever deletes the key completes the login.
        if !self.cache.del(&cache_key)? {
            return Err(AuthError::ChallengeInvalid);
        }

        let user = self.find_or_create_user(&linking_key)?;
        let token = self.sessions.create(&user.id)?;
        Ok((user, token))
    }

    fn find_or_create_user(&self, linking_key: &str) -> Result<User> {
        if let Some(user) = self
            .db
            .with_conn(|conn| conn.get_user_by_linking_key(linking_key))?
        {
            return Ok(user);
        }

        let whitelist_name = self
            .db
            .with_conn(|conn| conn.whitelist_get(linking_key))?
            .and_then(|entry| entry.display_name);
        let display_name = match whitelist_name {
            Some(name) => sanitize_display_name(&name)
                .unwrap_or_else(|_| default_display_name(linking_key)),
            None => default_display_name(linking_key),
        };

        Ok(self.db.transaction(|conn| {
            conn.create_user(&NewUser {
                id: entity_id(),
                username: None,
                password_hash: None,
                linking_key: Some(linking_key.to_string()),
                display_name: display_name.clone(),
                created_at: unix_now(),
            })
        })?)
    }

    /// One-time admin bootstrap: the configured secret promotes a
    /// linking key to admin on the whitelist.
    pub fn bootstrap_admin(
        &self,
        configured_secret: Option<&str>,
        provided_secret: &str,
        linking_key: &str,
    ) -> Result<()> {
        let Some(secret) = configured_secret else {
            return Err(AuthError::Forbidden);
        };
        if !constant_time_eq(secret.as_bytes(), provided_secret.as_bytes()) {
            tracing::warn!("Admin bootstrap with wrong secret");
            return Err(AuthError::Forbidden);
        }
        validate_linking_key(linking_key)?;

        self.db.with_conn(|conn| {
            conn.whitelist_add(&WhitelistEntry {
                linking_key: linking_key.to_string(),
                display_name: None,
                is_admin: true,
                approved_by: "bootstrap".to_string(),
                approved_at: unix_now(),
            })
        })?;
        tracing::info!("Admin bootstrap completed");
        Ok(())
    }

    /// Remove a linking key from the whitelist and destroy its user's
    /// sessions.
    pub fn revoke(&self, linking_key: &str) -> Result<bool> {
        let removed = self.db.with_conn(|conn| conn.whitelist_remove(linking_key))?;
        if removed {
            if let Some(user) = self
                .db
                .with_conn(|conn| conn.get_user_by_linking_key(linking_key))?
            {
                let destroyed = self.sessions.destroy_all_for_user(&user.id)?;
                tracing::info!(sessions = destroyed, "Whitelist revocation");
            }
        }
        Ok(removed)
    }
}

fn default_display_name(linking_key: &str) -> String {
    format!("player-{}", &linking_key[2..8.min(linking_key.len())])
}

fn decode_k1(k1_hex: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(k1_hex).map_err(|_| AuthError::ChallengeInvalid)?;
    bytes.try_into().map_err(|_| AuthError::ChallengeInvalid)
}

/// Verify a DER signature by `key_hex` over the raw k1 bytes.
fn verify_k1_signature(k1: &[u8; 32], sig_hex: &str, key_hex: &str) -> Result<()> {
    let sig_bytes = hex::decode(sig_hex).map_err(|_| AuthError::InvalidCredentials)?;
    let key_bytes = hex::decode(key_hex).map_err(|_| AuthError::InvalidCredentials)?;

    let secp = Secp256k1::verification_only();
    let public_key =
        PublicKey::from_slice(&key_bytes).map_err(|_| AuthError::InvalidCredentials)?;
    let signature =
        Signature::from_der(&sig_bytes).map_err(|_| AuthError::InvalidCredentials)?;
    let message = Message::from_digest(*k1);

    secp.verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| AuthError::InvalidCredentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_cache::MemoryCache;
    use secp256k1::SecretKey;

    fn service() -> (LnurlAuthService, Database) {
        let db = Database::open_in_memory().unwrap();
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let sessions = Arc::new(SessionManager::new(cache.clone()));
        (
            LnurlAuthService::new(db.clone(), cache, sessions),
            db,
        )
    }

    fn keypair() -> (SecretKey, String) {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x42u8; 32]).unwrap();
        let public = PublicKey::from_secret_key(&secp, &secret);
        (secret, hex::encode(public.serialize()))
    }

    fn sign_k1(secret: &SecretKey, k1_hex: &str) -> String {
        let secp = Secp256k1::new();
        let k1: [u8; 32] = hex::decode(k1_hex).unwrap().try_into().unwrap();
        let sig = secp.sign_ecdsa(&Message::from_digest(k1), secret);
        hex::encode(sig.serialize_der())
    }

    fn whitelist(db: &Database, key: &str, admin: bool) {
        db.with_conn(|conn| {
            conn.whitelist_add(&WhitelistEntry {
                linking_key: key.to_string(),
                display_name: Some("Satoshi".to_string()),
                is_admin: admin,
                approved_by: "test".to_string(),
                approved_at: unix_now(),
            })
        })
        .unwrap();
    }

    #[test]
    fn full_flow_mints_session() {
        let (auth, db) = service();
        let (secret, key) = keypair();
        whitelist(&db, &key, false);

        let k1 = auth.create_challenge().unwrap();
        assert_eq!(auth.status(&k1).unwrap(), ChallengeStatus::Pending);

        auth.verify(&k1, &sign_k1(&secret, &k1), &key).unwrap();
        assert_eq!(auth.status(&k1).unwrap(), ChallengeStatus::Verified);

        let (user, token) = auth.complete(&k1).unwrap();
        assert_eq!(user.linking_key.as_deref(), Some(key.as_str()));
        assert_eq!(user.display_name, "Satoshi");
        assert_eq!(token.len(), 64);

        // Single-use: a second complete fails.
        assert!(auth.complete(&k1).is_err());
    }

    #[test]
    fn non_whitelisted_key_is_rejected() {
        let (auth, _db) = service();
        let (secret, key) = keypair();

        let k1 = auth.create_challenge().unwrap();
        let err = auth.verify(&k1, &sign_k1(&secret, &k1), &key).unwrap_err();
        assert!(matches!(err, AuthError::NotWhitelisted));
    }

    #[test]
    fn bad_signature_is_rejected() {
        let (auth, db) = service();
        let (secret, key) = keypair();
        whitelist(&db, &key, false);

        let k1 = auth.create_challenge().unwrap();
        let other_k1 = auth.create_challenge().unwrap();
        // Signature over a different challenge must not verify.
        let err = auth
            .verify(&k1, &sign_k1(&secret, &other_k1), &key)
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[test]
    fn complete_requires_verification() {
        let (auth, _db) = service();
        let k1 = auth.create_challenge().unwrap();
        assert!(auth.complete(&k1).is_err());
        assert!(auth.complete(&"00".repeat(32)).is_err());
    }

    #[test]
    fn repeat_login_reuses_user() {
        let (auth, db) = service();
        let (secret, key) = keypair();
        whitelist(&db, &key, false);

        let k1 = auth.create_challenge().unwrap();
        auth.verify(&k1, &sign_k1(&secret, &k1), &key).unwrap();
        let (first, _) = auth.complete(&k1).unwrap();

        let k1 = auth.create_challenge().unwrap();
        auth.verify(&k1, &sign_k1(&secret, &k1), &key).unwrap();
        let (second, _) = auth.complete(&k1).unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn bootstrap_and_revoke() {
        let (auth, db) = service();
        let (_, key) = keypair();

        assert!(auth.bootstrap_admin(None, "secret", &key).is_err());
        assert!(auth
            .bootstrap_admin(Some("secret"), "wrong", &key)
            .is_err());
        auth.bootstrap_admin(Some("secret"), "secret", &key).unwrap();

        let entry = db.with_conn(|conn| conn.whitelist_get(&key)).unwrap().unwrap();
        assert!(entry.is_admin);

        assert!(auth.revoke(&key).unwrap());
        assert!(!auth.revoke(&key).unwrap());
    }
}
