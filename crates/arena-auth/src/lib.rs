//! Session and access-control substrate for sats-arena.
//!
//! Bearer-token sessions with a sliding TTL, CSRF double-submit tokens,
//! cache-backed rate limiting, password registration/login, and the
//! LNURL-auth challenge flow gated by the whitelist. Everything
//! security-sensitive compares in constant time and logs without user
//! ids.

pub mod accounts;
pub mod csrf;
pub mod lnurl_auth;
pub mod password;
pub mod ratelimit;
pub mod sanitize;
pub mod session;

pub use accounts::AccountService;
pub use csrf::{mint_csrf_token, validate_csrf, CSRF_COOKIE, CSRF_HEADER};
pub use lnurl_auth::LnurlAuthService;
pub use ratelimit::{RateLimit, RateLimiter};
pub use session::SessionManager;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad input shape or out-of-range value; message is user-visible.
    #[error("{0}")]
    Validation(String),

    /// Wrong username/password or unverifiable signature. Deliberately
    /// uniform so callers cannot probe which part failed.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No or expired session.
    #[error("authentication required")]
    Unauthenticated,

    /// Authenticated but not allowed (CSRF, ownership, whitelist).
    #[error("forbidden")]
    Forbidden,

    /// Linking key is not on the whitelist.
    #[error("linking key is not whitelisted")]
    NotWhitelisted,

    /// Challenge missing, expired, or in the wrong state.
    #[error("challenge is invalid or expired")]
    ChallengeInvalid,

    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Db(#[from] arena_db::DbError),

    #[error(transparent)]
    Cache(#[from] arena_cache::CacheError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
