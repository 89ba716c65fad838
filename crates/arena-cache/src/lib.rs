//! TTL-keyed ephemeral cache for sats-arena.
//!
//! Holds everything short-lived and reconstructible: invoice intents,
//! webhook idempotency markers, active attempt handles, sessions, CSRF
//! tokens, rate-limit counters, LNURL-auth challenges. Two of the trait
//! operations double as concurrency primitives:
//!
//! - [`Cache::del`] returns whether the key existed, which lets the
//!   webhook and polling paths race for a payment intent with exactly one
//!   winner.
//! - [`Cache::set_if_not_exists`] is the claim primitive for webhook
//!   idempotency markers.
//!
//! The backing store is pluggable. [`MemoryCache`] is the in-process
//! implementation (bounded, LRU-evicted, periodically swept); a remote
//! keyed store can implement the same trait for multi-instance
//! deployments.

pub mod keys;
pub mod memory;
pub mod records;

pub use memory::{spawn_sweeper, MemoryCache};

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend failure: {0}")]
    Backend(String),

    #[error("cache value is not valid for this operation")]
    InvalidValue,
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// TTL key→blob store.
pub trait Cache: Send + Sync {
    /// Overwrite `key` with `value`, expiring after `ttl`.
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Value for `key`, or `None` on miss or expiry.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete `key`, returning true iff it existed (and was unexpired)
    /// at delete time.
    fn del(&self, key: &str) -> Result<bool>;

    /// Set `key` only when absent; true iff newly created.
    fn set_if_not_exists(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool>;

    /// Increment the counter at `key`, creating it with `ttl` when
    /// absent. Returns the new count.
    fn incr(&self, key: &str, ttl: Duration) -> Result<u64>;

    /// Reset the TTL of an existing key; false on miss.
    fn touch(&self, key: &str, ttl: Duration) -> Result<bool>;

    /// Live keys starting with `prefix`.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>>;

    /// Remaining TTL of a live key.
    fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>>;
}

/// Serialize a record into a cache value.
pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| CacheError::Backend(e.to_string()))
}

/// Deserialize a cache value; `None` input passes through.
pub fn decode<T: serde::de::DeserializeOwned>(value: Option<Vec<u8>>) -> Result<Option<T>> {
    match value {
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|_| CacheError::InvalidValue),
        None => Ok(None),
    }
}
