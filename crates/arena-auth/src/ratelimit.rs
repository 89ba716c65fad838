//! Cache-backed rate limiting.
//!
//! Fixed-window counters keyed by scope and client. Backing the counters
//! with the ephemeral cache keeps them shared across handlers and, with a
//! remote cache, across restarts.

use std::sync::Arc;
use std::time::Duration;

use arena_cache::{keys, Cache};

use crate::{AuthError, Result};

/// A named limit: at most `max` requests per `window`.
#[derive(Debug, Clone, Copy)]
pub struct RateLimit {
    pub scope: &'static str,
    pub max: u64,
    pub window: Duration,
}

impl RateLimit {
    pub const GLOBAL: RateLimit = RateLimit {
        scope: "global",
        max: 100,
        window: Duration::from_secs(15 * 60),
    };
    pub const AUTH: RateLimit = RateLimit {
        scope: "auth",
        max: 10,
        window: Duration::from_secs(15 * 60),
    };
    pub const PAYMENTS: RateLimit = RateLimit {
        scope: "payments",
        max: 5,
        window: Duration::from_secs(60),
    };
    pub const GAME_SUBMIT: RateLimit = RateLimit {
        scope: "game-submit",
        max: 20,
        window: Duration::from_secs(60),
    };
    pub const ADMIN_BOOTSTRAP: RateLimit = RateLimit {
        scope: "admin-bootstrap",
        max: 5,
        window: Duration::from_secs(15 * 60),
    };
}

pub struct RateLimiter {
    cache: Arc<dyn Cache>,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Count one request; error when the window's budget is exhausted.
    pub fn check(&self, limit: RateLimit, client: &str) -> Result<()> {
        let key = keys::rate(limit.scope, client);
        let count = self.cache.incr(&key, limit.window)?;
        if count > limit.max {
            let retry_after_secs = self
                .cache
                .ttl_remaining(&key)?
                .map(|d| d.as_secs().max(1))
                .unwrap_or(limit.window.as_secs());
            return Err(AuthError::RateLimited { retry_after_secs });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_cache::MemoryCache;

    #[test]
    fn enforces_budget_per_client() {
        let limiter = RateLimiter::new(Arc::new(MemoryCache::new()));
        let limit = RateLimit {
            scope: "test",
            max: 3,
            window: Duration::from_secs(60),
        };

        for _ in 0..3 {
            limiter.check(limit, "1.2.3.4").unwrap();
        }
        let err = limiter.check(limit, "1.2.3.4").unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { retry_after_secs } if retry_after_secs > 0));

        // A different client has its own budget.
        limiter.check(limit, "5.6.7.8").unwrap();
    }

    #[test]
    fn window_expiry_resets_budget() {
        let limiter = RateLimiter::new(Arc::new(MemoryCache::new()));
        let limit = RateLimit {
            scope: "test",
            max: 1,
            window: Duration::from_millis(30),
        };

        limiter.check(limit, "c").unwrap();
        assert!(limiter.check(limit, "c").is_err());

        std::thread::sleep(Duration::from_millis(50));
        limiter.check(limit, "c").unwrap();
    }
}
