//! The generic cache contract the L2P and P2L readers require (§4.8), plus
//! one concrete, thread-safe implementation.
//!
//! §5 asks for a cache that is "shared across readers and must be
//! internally synchronized; the implementation is given a generic cache
//! whose thread-safety is its own responsibility." Both readers in this
//! crate depend only on the [`Cache`] trait below, never on
//! [`BoundedCache`] directly, so a caller may substitute any other
//! thread-safe implementation (an external distributed cache, for
//! instance) without touching the lookup algorithms.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::sync::Arc;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;

/// Cache key shared by all four caches in §3: a header/page cache is keyed
/// by the first revision of the index file that covers it (or the base
/// revision, before the page table is known) plus whether that shard is
/// packed; a page cache additionally carries the page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeaderKey {
    pub base_revision: u64,
    pub is_packed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub first_revision: u64,
    pub is_packed: bool,
    pub page_no: u64,
}

/// `get`, `has_key`, and `set` from §4.8. `get_partial` is provided
/// separately (below) for caches whose value is a serialized blob, since it
/// needs a borrow of the raw bytes rather than an owned clone.
///
/// Contract: the cache may evict at any time; no cached value is ever
/// mutated after `set`. Per the Open Question resolution in `DESIGN.md`
/// (Design Notes §9), every `get` returns an owned copy — there is no
/// cache-pin API, so a caller may hold the returned value past any later
/// eviction.
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;
    fn has_key(&self, key: &K) -> bool;
    fn set(&self, key: K, value: V);
}

/// Extra operation for caches whose value is an opaque serialized blob
/// (the two header caches): resolve one field via `getter` without cloning
/// the whole blob. "A partial-getter must not retain pointers into the blob
/// past the call" (§4.8) — enforced here by the `getter` closure's borrow
/// lifetime.
pub trait PartialCache<K>: Cache<K, Arc<Vec<u8>>> {
    fn get_partial<T>(&self, key: &K, getter: impl FnOnce(&[u8]) -> T) -> Option<T> {
        self.get(key).map(|blob| getter(&blob))
    }
}

impl<K, C: Cache<K, Arc<Vec<u8>>>> PartialCache<K> for C {}

/// A bounded, thread-safe cache: storage is a lock-striped [`DashMap`] (the
/// hot `get`/`set` path never blocks on a single global lock); eviction
/// order is tracked separately in an unbounded [`LruCache`] guarded by a
/// [`parking_lot::Mutex`], touched only to record recency and to pick a
/// victim once the map grows past `capacity`.
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: DashMap<K, V>,
    recency: Mutex<LruCache<K, ()>>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(capacity: usize) -> Self {
        BoundedCache {
            capacity: capacity.max(1),
            entries: DashMap::new(),
            recency: Mutex::new(LruCache::unbounded()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K, V> Cache<K, V> for BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &K) -> Option<V> {
        let hit = self.entries.get(key).map(|entry| entry.value().clone());
        if hit.is_some() {
            self.recency.lock().get(key);
        } else {
            tracing::trace!("cache miss");
        }
        hit
    }

    fn has_key(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn set(&self, key: K, value: V) {
        self.entries.insert(key.clone(), value);
        let mut recency = self.recency.lock();
        recency.put(key, ());
        while recency.len() > self.capacity {
            match recency.pop_lru() {
                Some((evicted_key, _)) => {
                    self.entries.remove(&evicted_key);
                }
                None => break,
            }
        }
    }
}

/// Convenience: a `BoundedCache` sized from a page/entry count and an
/// estimated bytes-per-entry figure, so callers don't have to hand-pick raw
/// capacities. Not part of the §4.8 contract — a constructor helper only.
pub fn sized_cache<K, V>(approx_entries: usize) -> BoundedCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    BoundedCache::new(approx_entries.max(NonZeroUsize::new(1).unwrap().get()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_hits() {
        let cache: BoundedCache<u64, Arc<Vec<u8>>> = BoundedCache::new(4);
        cache.set(1, Arc::new(vec![1, 2, 3]));
        assert!(cache.has_key(&1));
        assert_eq!(cache.get(&1).unwrap().as_slice(), &[1, 2, 3]);
        assert!(!cache.has_key(&2));
    }

    #[test]
    fn eviction_drops_oldest() {
        let cache: BoundedCache<u64, u64> = BoundedCache::new(2);
        cache.set(1, 10);
        cache.set(2, 20);
        cache.set(3, 30); // evicts 1
        assert!(!cache.has_key(&1));
        assert!(cache.has_key(&2));
        assert!(cache.has_key(&3));
    }

    #[test]
    fn partial_get_resolves_without_cloning_whole_blob() {
        let cache: BoundedCache<u64, Arc<Vec<u8>>> = BoundedCache::new(4);
        cache.set(1, Arc::new(vec![9, 9, 9, 9, 42]));
        let fourth = cache.get_partial(&1, |bytes| bytes[4]);
        assert_eq!(fourth, Some(42));
        assert_eq!(cache.get_partial(&2, |_| 0u8), None);
    }
}
