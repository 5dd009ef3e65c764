//! Per-entity LRU caches sitting in front of the SQL engine (§4.2).
//!
//! Each entity type gets its own bounded cache keyed by `LocalId`. Callers
//! must `invalidate` before a write commits and `put` only after it
//! succeeds — holding a stale cached value across a write is the one bug
//! class this type is built to make impossible to write by accident.

use std::num::NonZeroUsize;

use kn_domain::LocalId;
use lru::LruCache;

pub struct EntityCache<V> {
    inner: LruCache<LocalId, V>,
}

impl<V: Clone> EntityCache<V> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, id: &LocalId) -> Option<V> {
        self.inner.get(id).cloned()
    }

    pub fn put(&mut self, id: LocalId, value: V) {
        self.inner.put(id, value);
    }

    /// Removes a (possibly stale) entry. Call this before issuing the write
    /// that makes it stale, not after — a reader racing the write should
    /// see a cache miss and fall through to storage rather than an
    /// overwritten-but-not-yet-consistent value.
    pub fn invalidate(&mut self, id: &LocalId) {
        self.inner.pop(id);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Secondary cache keyed by the case-insensitive uppercased name, used for
/// the uniqueness pre-checks that run ahead of an insert (§3 "unique").
pub struct NameCache {
    inner: LruCache<String, LocalId>,
}

impl NameCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::new(1).unwrap());
        Self {
            inner: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, upper_name: &str) -> Option<LocalId> {
        self.inner.get(upper_name).copied()
    }

    pub fn put(&mut self, upper_name: String, id: LocalId) {
        self.inner.put(upper_name, id);
    }

    pub fn invalidate(&mut self, upper_name: &str) {
        self.inner.pop(upper_name);
    }
}
