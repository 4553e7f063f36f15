//! Memoization over a [`CacheBackend`].

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::config::CacheSettings;

use super::backend::CacheBackend;

/// Builds a cache key: `prefix:name:chunk:chunk…`, spaces replaced by `_`.
pub fn cache_key(prefix: &str, name: &str, chunks: &[String]) -> String {
    let mut parts = Vec::with_capacity(chunks.len() + 2);
    parts.push(prefix);
    parts.push(name);
    parts.extend(chunks.iter().map(String::as_str));
    parts.join(":").replace(' ', "_")
}

/// A named, TTL-bound slice of a cache.
///
/// ```rust
/// use std::sync::Arc;
/// use tsu_common::cache::{MemoryCache, Memo};
/// use tsu_common::config::CacheSettings;
///
/// let memo = Memo::new(Arc::new(MemoryCache::new()), "sum_to", &CacheSettings::default());
/// let n = 30u64;
/// let value: u64 = memo.memoize(&[&n], || (1..=n).sum());
/// let again: u64 = memo.memoize(&[&n], || unreachable!());
/// assert_eq!(value, again);
/// ```
#[derive(Clone)]
pub struct Memo {
    backend: Arc<dyn CacheBackend>,
    prefix: String,
    name: String,
    ttl: Duration,
}

impl Memo {
    pub fn new(backend: Arc<dyn CacheBackend>, name: impl Into<String>, settings: &CacheSettings) -> Self {
        Self {
            backend,
            prefix: settings.key_prefix.clone(),
            name: name.into(),
            ttl: settings.ttl(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn key(&self, chunks: &[String]) -> String {
        cache_key(&self.prefix, &self.name, chunks)
    }

    /// Returns the cached value for `chunks`, computing and storing it on a
    /// miss. `None` chunks bypass the cache entirely.
    pub fn get_or_insert_with<T, F>(&self, chunks: Option<Vec<String>>, compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let Some(chunks) = chunks else {
            return compute();
        };
        let key = self.key(&chunks);
        if let Some(hit) = self.lookup(&key) {
            return hit;
        }
        let value = compute();
        self.store(&key, &value);
        value
    }

    /// Memoizes on positional arguments only, by their `Display` form.
    pub fn memoize<T, F>(&self, args: &[&dyn Display], compute: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let chunks = args.iter().map(|a| a.to_string()).collect();
        self.get_or_insert_with(Some(chunks), compute)
    }

    /// Cached value under `key`. Entries that no longer decode count as a miss.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(bytes) = self.backend.get(key) else {
            debug!(key, "cache miss");
            return None;
        };
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                debug!(key, "cache miss, undecodable entry: {e}");
                None
            }
        }
    }

    pub fn store<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.backend.set(key, bytes, self.ttl),
            Err(e) => warn!(key, "value not cached: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use std::cell::Cell;

    fn memo() -> Memo {
        let settings = CacheSettings { key_prefix: "site".into(), ..Default::default() };
        Memo::new(Arc::new(MemoryCache::new()), "answer", &settings)
    }

    #[test]
    fn test_cache_key_joins_and_replaces_spaces() {
        let key = cache_key("site", "view", &["bob smith".into(), "en".into(), "/a b/".into()]);
        assert_eq!(key, "site:view:bob_smith:en:/a_b/");
    }

    #[test]
    fn test_second_call_is_a_hit() {
        let memo = memo();
        let calls = Cell::new(0);
        let compute = || {
            calls.set(calls.get() + 1);
            vec!["x".to_owned()]
        };
        let first: Vec<String> = memo.get_or_insert_with(Some(vec!["1".into()]), compute);
        let second: Vec<String> = memo.get_or_insert_with(Some(vec!["1".into()]), compute);
        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_none_chunks_bypass_cache() {
        let memo = memo();
        let calls = Cell::new(0);
        for _ in 0..2 {
            let _: u8 = memo.get_or_insert_with(None, || {
                calls.set(calls.get() + 1);
                7
            });
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_memoize_keys_on_arguments() {
        let memo = memo();
        let a: String = memo.memoize(&[&1, &"x"], || "first".into());
        let b: String = memo.memoize(&[&2, &"x"], || "second".into());
        let c: String = memo.memoize(&[&1, &"x"], || "third".into());
        assert_eq!((a.as_str(), b.as_str(), c.as_str()), ("first", "second", "first"));
    }

    #[test]
    fn test_undecodable_entry_is_a_miss() {
        let backend = Arc::new(MemoryCache::new());
        let memo = Memo::new(backend.clone(), "n", &CacheSettings::default());
        backend.set(&memo.key(&["k".into()]), b"not json".to_vec(), Duration::from_secs(60));
        let value: u32 = memo.get_or_insert_with(Some(vec!["k".into()]), || 5);
        assert_eq!(value, 5);
    }
}
