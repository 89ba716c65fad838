//! In-process cache backing.
//!
//! A bounded map with per-entry expiry. Recency is tracked lazily: every
//! access pushes a (key, generation) pair onto a queue and bumps the
//! entry's generation; eviction pops the queue and skips stale pairs, so
//! the oldest *live* access is evicted first. A periodic sweep drops
//! expired entries so an idle server does not pin memory until the next
//! access; the sweep task stops on shutdown.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::{Cache, CacheError, Result};

/// Default maximum number of entries.
pub const DEFAULT_CAPACITY: usize = 100_000;

struct Slot {
    value: Vec<u8>,
    expires_at: Instant,
    generation: u64,
}

struct Inner {
    slots: HashMap<String, Slot>,
    /// Lazy recency queue of (key, generation-at-access).
    order: VecDeque<(String, u64)>,
    next_generation: u64,
    capacity: usize,
}

impl Inner {
    fn touch_order(&mut self, key: &str) -> u64 {
        let generation = self.next_generation;
        self.next_generation += 1;
        self.order.push_back((key.to_string(), generation));
        generation
    }

    fn evict_if_full(&mut self) {
        while self.slots.len() > self.capacity {
            let Some((key, generation)) = self.order.pop_front() else {
                break;
            };
            let stale = self
                .slots
                .get(&key)
                .map(|slot| slot.generation != generation)
                .unwrap_or(true);
            if !stale {
                self.slots.remove(&key);
            }
        }
        // Bound the queue itself; stale pairs accumulate between sweeps.
        let max_order = self.capacity.saturating_mul(4).max(1024);
        while self.order.len() > max_order {
            if let Some((key, generation)) = self.order.pop_front() {
                let live = self
                    .slots
                    .get(&key)
                    .map(|slot| slot.generation == generation)
                    .unwrap_or(false);
                if live {
                    // Keep live entries reachable by re-queueing.
                    self.order.push_back((key, generation));
                }
            }
        }
    }
}

/// Bounded in-process TTL cache.
pub struct MemoryCache {
    inner: Mutex<Inner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                order: VecDeque::new(),
                next_generation: 0,
                capacity: capacity.max(1),
            }),
        }
    }

    /// Drop all expired entries. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.slots.len();
        inner.slots.retain(|_, slot| slot.expires_at > now);
        let removed = before - inner.slots.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = inner.slots.len(), "Cache sweep");
        }
        removed
    }

    /// Number of live (possibly expired, not yet swept) entries.
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Cache for MemoryCache {
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock();
        let generation = inner.touch_order(key);
        inner.slots.insert(
            key.to_string(),
            Slot {
                value: value.to_vec(),
                expires_at: Instant::now() + ttl,
                generation,
            },
        );
        inner.evict_if_full();
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.slots.get(key) {
            Some(slot) if slot.expires_at > now => {
                let value = slot.value.clone();
                let generation = inner.touch_order(key);
                if let Some(slot) = inner.slots.get_mut(key) {
                    slot.generation = generation;
                }
                Ok(Some(value))
            }
            Some(_) => {
                inner.slots.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn del(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.slots.remove(key) {
            Some(slot) => Ok(slot.expires_at > now),
            None => Ok(false),
        }
    }

    fn set_if_not_exists(&self, key: &str, value: &[u8], ttl: Duration) -> Result<bool> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let live = inner
            .slots
            .get(key)
            .map(|slot| slot.expires_at > now)
            .unwrap_or(false);
        if live {
            return Ok(false);
        }
        let generation = inner.touch_order(key);
        inner.slots.insert(
            key.to_string(),
            Slot {
                value: value.to_vec(),
                expires_at: now + ttl,
                generation,
            },
        );
        inner.evict_if_full();
        Ok(true)
    }

    fn incr(&self, key: &str, ttl: Duration) -> Result<u64> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        let current = match inner.slots.get(key) {
            Some(slot) if slot.expires_at > now => {
                let text = std::str::from_utf8(&slot.value).map_err(|_| CacheError::InvalidValue)?;
                Some((
                    text.parse::<u64>().map_err(|_| CacheError::InvalidValue)?,
                    slot.expires_at,
                ))
            }
            _ => None,
        };

        let (count, expires_at) = match current {
            // Counters keep their original window rather than sliding.
            Some((count, expires_at)) => (count + 1, expires_at),
            None => (1, now + ttl),
        };

        let generation = inner.touch_order(key);
        inner.slots.insert(
            key.to_string(),
            Slot {
                value: count.to_string().into_bytes(),
                expires_at,
                generation,
            },
        );
        inner.evict_if_full();
        Ok(count)
    }

    fn touch(&self, key: &str, ttl: Duration) -> Result<bool> {
        let mut inner = self.inner.lock();
        let now = Instant::now();
        match inner.slots.get_mut(key) {
            Some(slot) if slot.expires_at > now => {
                slot.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock();
        let now = Instant::now();
        Ok(inner
            .slots
            .iter()
            .filter(|(key, slot)| key.starts_with(prefix) && slot.expires_at > now)
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        let inner = self.inner.lock();
        let now = Instant::now();
        Ok(inner.slots.get(key).and_then(|slot| {
            if slot.expires_at > now {
                Some(slot.expires_at - now)
            } else {
                None
            }
        }))
    }
}

/// Spawn the periodic expired-entry sweep.
///
/// The task exits when the shutdown channel fires; the returned handle
/// lets callers await that exit during graceful shutdown.
pub fn spawn_sweeper(
    cache: Arc<MemoryCache>,
    interval: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    cache.sweep_expired();
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Cache sweeper stopping");
                    break;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);
    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn set_get_del_roundtrip() {
        let cache = MemoryCache::new();
        cache.set("k1", b"v1", TTL).unwrap();
        assert_eq!(cache.get("k1").unwrap().as_deref(), Some(&b"v1"[..]));

        assert!(cache.del("k1").unwrap());
        assert!(!cache.del("k1").unwrap());
        assert!(cache.get("k1").unwrap().is_none());
    }

    #[test]
    fn del_claims_exactly_once() {
        let cache = MemoryCache::new();
        cache.set("claim", b"x", TTL).unwrap();

        let first = cache.del("claim").unwrap();
        let second = cache.del("claim").unwrap();
        assert!(first);
        assert!(!second);
    }

    #[test]
    fn expiry_hides_entries() {
        let cache = MemoryCache::new();
        cache.set("k1", b"v1", SHORT).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert!(cache.get("k1").unwrap().is_none());
        // Expired entries do not count as existing for del either.
        cache.set("k2", b"v2", SHORT).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(!cache.del("k2").unwrap());
    }

    #[test]
    fn set_if_not_exists_claims_once() {
        let cache = MemoryCache::new();
        assert!(cache.set_if_not_exists("m", b"1", TTL).unwrap());
        assert!(!cache.set_if_not_exists("m", b"1", TTL).unwrap());

        // Expired markers can be reclaimed.
        cache.set("m2", b"1", SHORT).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.set_if_not_exists("m2", b"1", TTL).unwrap());
    }

    #[test]
    fn incr_counts_within_window() {
        let cache = MemoryCache::new();
        assert_eq!(cache.incr("c", TTL).unwrap(), 1);
        assert_eq!(cache.incr("c", TTL).unwrap(), 2);
        assert_eq!(cache.incr("c", TTL).unwrap(), 3);

        cache.set("c2", b"1", SHORT).unwrap();
        std::thread::sleep(Duration::from_millis(40));
        assert_eq!(cache.incr("c2", TTL).unwrap(), 1);
    }

    #[test]
    fn touch_extends_live_keys_only() {
        let cache = MemoryCache::new();
        cache.set("k", b"v", SHORT).unwrap();
        assert!(cache.touch("k", TTL).unwrap());
        std::thread::sleep(Duration::from_millis(40));
        // Extended beyond the original short TTL.
        assert!(cache.get("k").unwrap().is_some());

        assert!(!cache.touch("missing", TTL).unwrap());
    }

    #[test]
    fn scan_prefix_lists_live_keys() {
        let cache = MemoryCache::new();
        cache.set("session:aaa", b"1", TTL).unwrap();
        cache.set("session:bbb", b"1", TTL).unwrap();
        cache.set("other:ccc", b"1", TTL).unwrap();

        let mut keys = cache.scan_prefix("session:").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["session:aaa", "session:bbb"]);
    }

    #[test]
    fn capacity_evicts_least_recently_used() {
        let cache = MemoryCache::with_capacity(3);
        cache.set("a", b"1", TTL).unwrap();
        cache.set("b", b"1", TTL).unwrap();
        cache.set("c", b"1", TTL).unwrap();

        // Refresh "a" so "b" becomes the oldest access.
        cache.get("a").unwrap();
        cache.set("d", b"1", TTL).unwrap();

        assert!(cache.get("b").unwrap().is_none());
        assert!(cache.get("a").unwrap().is_some());
        assert!(cache.get("c").unwrap().is_some());
        assert!(cache.get("d").unwrap().is_some());
    }

    #[test]
    fn sweep_removes_expired() {
        let cache = MemoryCache::new();
        cache.set("k1", b"v", SHORT).unwrap();
        cache.set("k2", b"v", TTL).unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(cache.sweep_expired(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn sweeper_stops_on_shutdown() {
        let cache = Arc::new(MemoryCache::new());
        let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let handle = spawn_sweeper(cache, Duration::from_millis(10), shutdown_rx);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
