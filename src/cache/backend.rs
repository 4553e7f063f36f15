//! Cache backends.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A key/value store with per-entry expiry.
///
/// Values are opaque bytes; [`Memo`](super::Memo) handles (de)serialisation.
/// Implement this over memcached, Redis or similar to share a cache
/// between processes.
pub trait CacheBackend: Send + Sync + 'static {
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Stores `value` for `ttl`. A zero `ttl` stores nothing.
    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// Entry count that triggers the first expiry sweep on `set`.
const SWEEP_FLOOR: usize = 1024;

/// Process-local backend.
///
/// Expired entries are dropped when read, and swept from the whole map
/// whenever a `set` finds it has doubled since the last sweep.
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    sweep_at: usize,
}

impl State {
    fn sweep(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        self.sweep_at = (self.entries.len() * 2).max(SWEEP_FLOOR);
        before - self.entries.len()
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored entries, including expired ones not swept yet.
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.state.lock().entries.clear();
    }

    /// Drops every expired entry now. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        self.state.lock().sweep(Instant::now())
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut state = self.state.lock();
        match state.entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                state.entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut state = self.state.lock();
        if state.entries.len() >= state.sweep_at.max(SWEEP_FLOOR) {
            let removed = state.sweep(now);
            tracing::debug!(removed, kept = state.entries.len(), "swept expired cache entries");
        }
        state.entries.insert(key.to_owned(), Entry { value, expires_at: now + ttl });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_returns_until_expiry() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::from_millis(50));
        assert_eq!(cache.get("k").as_deref(), Some(&b"v"[..]));

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_zero_ttl_stores_nothing() {
        let cache = MemoryCache::new();
        cache.set("k", b"v".to_vec(), Duration::ZERO);
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_expired_entries_are_swept_on_growth() {
        let cache = MemoryCache::new();
        for i in 0..SWEEP_FLOOR {
            cache.set(&format!("page:{i}"), b"v".to_vec(), Duration::from_millis(1));
        }
        std::thread::sleep(Duration::from_millis(20));

        cache.set("fresh", b"v".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh").as_deref(), Some(&b"v"[..]));
    }

    #[test]
    fn test_sweep_keeps_live_entries() {
        let cache = MemoryCache::new();
        cache.set("old", b"v".to_vec(), Duration::from_millis(1));
        cache.set("live", b"v".to_vec(), Duration::from_secs(60));
        std::thread::sleep(Duration::from_millis(20));

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("live").is_some());
    }
}
