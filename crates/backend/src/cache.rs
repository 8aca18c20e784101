//! Backend response cache
//!
//! Caches response bodies under (remote command, payload) for as long as the
//! backend said they stay valid. Entries are never served at or after their
//! expiry, whether or not the sweeper has reclaimed them yet.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Longest lifetime an entry can get; longer TTLs are clamped
const LONGEST_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Shortest interval the background sweeper runs at
const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Cache key. Includes the payload so different arguments to one command
/// never share an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub command: String,
    pub payload: String,
}

impl CacheKey {
    pub fn new(command: &str, payload: &str) -> Self {
        Self {
            command: command.to_string(),
            payload: payload.to_string(),
        }
    }
}

struct CacheEntry {
    value: String,
    expires_at: Instant,
}

/// Concurrent TTL cache for backend responses
pub struct ResponseCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a cached response
    pub fn get(&self, command: &str, payload: &str) -> Option<String> {
        self.get_at(command, payload, Instant::now())
    }

    /// Look up a cached response as of `now`
    pub fn get_at(&self, command: &str, payload: &str, now: Instant) -> Option<String> {
        let key = CacheKey::new(command, payload);
        self.entries.read().get(&key).and_then(|entry| {
            if now < entry.expires_at {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    /// Store a response for `ttl`. A zero TTL stores nothing.
    ///
    /// Returns whether an entry was stored.
    pub fn insert(&self, command: &str, payload: &str, value: String, ttl: Duration) -> bool {
        self.insert_at(command, payload, value, ttl, Instant::now())
    }

    /// Store a response for `ttl` starting at `now`
    pub fn insert_at(
        &self,
        command: &str,
        payload: &str,
        value: String,
        ttl: Duration,
        now: Instant,
    ) -> bool {
        if ttl.is_zero() {
            return false;
        }

        let expires_at = now + ttl.min(LONGEST_TTL);
        self.entries
            .write()
            .insert(CacheKey::new(command, payload), CacheEntry { value, expires_at });
        true
    }

    /// Remove an entry
    pub fn remove(&self, command: &str, payload: &str) -> Option<String> {
        self.entries
            .write()
            .remove(&CacheKey::new(command, payload))
            .map(|e| e.value)
    }

    /// Number of stored entries, expired or not
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove all expired entries, returning how many were removed
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    /// Remove entries expired as of `now`
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at);
        before - entries.len()
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Run [`sweep`](Self::sweep) every `interval` on the current tokio
    /// runtime. The task holds a weak reference and ends once the cache is
    /// dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache = Arc::downgrade(self);
        let interval = interval.max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep();
                if removed > 0 {
                    debug!(removed, remaining = cache.len(), "Swept expired cache entries");
                }
            }
        })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
