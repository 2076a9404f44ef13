//! Result cache using moka
//!
//! Bounded LRU cache of generated programs keyed by [`RequestKey`].
//! Error-marker programs are never stored.

use std::sync::Arc;

use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use snapgen_program::{GeneratedProgram, RequestKey};

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entry_count: u64,
    pub capacity: u64,
}

/// Request-keyed program cache
#[derive(Debug, Clone)]
pub struct ProgramCache {
    inner: Cache<RequestKey, Arc<GeneratedProgram>>,
    capacity: u64,
}

impl ProgramCache {
    /// Create cache holding at most `capacity` programs
    #[must_use]
    pub fn new(capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
            capacity,
        }
    }

    /// Look up a program; a hit refreshes its recency
    #[inline]
    #[must_use]
    pub fn get(&self, key: &RequestKey) -> Option<GeneratedProgram> {
        self.inner.get(key).map(|p| (*p).clone())
    }

    /// Store a program unless it is an error marker
    ///
    /// Returns whether the program was stored.
    pub fn insert(&self, key: RequestKey, program: &GeneratedProgram) -> bool {
        if program.is_error() {
            return false;
        }
        self.inner.insert(key, Arc::new(program.clone()));
        // apply eviction now so the bound holds on return
        self.inner.run_pending_tasks();
        true
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, key: &RequestKey) -> bool {
        self.inner.contains_key(key)
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks();
    }

    #[inline]
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.inner.entry_count(),
            capacity: self.capacity,
        }
    }
}

impl Default for ProgramCache {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(text: &str) -> RequestKey {
        RequestKey::for_request(text, "Sprite", "beginner")
    }

    fn program() -> GeneratedProgram {
        GeneratedProgram::new("Sprite", vec![])
    }

    #[test]
    fn stores_and_returns() {
        let cache = ProgramCache::new(10);
        assert!(cache.insert(key("jump"), &program()));
        assert_eq!(cache.get(&key("JUMP ")), Some(program()));
    }

    #[test]
    fn error_programs_are_not_cached() {
        let cache = ProgramCache::new(10);
        let marker = GeneratedProgram::error_fallback("boom", "jump");
        assert!(!cache.insert(key("jump"), &marker));
        assert!(!cache.contains(&key("jump")));
    }

    #[test]
    fn evicts_least_recently_used() {
        let cache = ProgramCache::new(2);
        cache.insert(key("a"), &program());
        cache.insert(key("b"), &program());
        // touch "a" so "b" becomes the oldest
        assert!(cache.get(&key("a")).is_some());
        cache.insert(key("c"), &program());

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
        assert_eq!(cache.stats().entry_count, 2);
    }

    #[test]
    fn clear_empties() {
        let cache = ProgramCache::default();
        cache.insert(key("a"), &program());
        cache.clear();
        assert_eq!(cache.stats().entry_count, 0);
        assert_eq!(cache.stats().capacity, 100);
    }
}
