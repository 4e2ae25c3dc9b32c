//! Least-recently-used cache with explicit byte bookkeeping.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;

use super::{fire_removed, MemoryCache, RemovalListener};

struct CacheEntry<V> {
    value: Arc<V>,
    size: u64,
    /// Stamp from the cache-wide clock; larger is more recent.
    last_used: AtomicU64,
}

/// A capacity-bounded cache evicting least-recently-used entries.
///
/// Lookups and containment checks go straight to a concurrent map and never
/// block. Additions, removals and evictions serialize on a single mutex;
/// eviction sorts entries by last-access stamp and drains oldest-first until
/// usage is at or below the low-water mark and the incoming entry fits. The
/// sort is O(n log n) per eviction event, which is acceptable because
/// evictions are infrequent relative to lookups.
pub struct LruMemoryCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, CacheEntry<V>>,
    clock: AtomicU64,
    used: AtomicU64,
    capacity: u64,
    low_water: AtomicU64,
    mutation: Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn RemovalListener<K, V>>>>,
}

impl<K, V> LruMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a cache of `capacity` units with a low-water mark at 80%.
    pub fn new(capacity: u64) -> Self {
        assert!(capacity > 0, "cache capacity must be positive");
        LruMemoryCache {
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            used: AtomicU64::new(0),
            capacity,
            low_water: AtomicU64::new(capacity - capacity / 5),
            mutation: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
        }
    }

    fn stamp(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn notify_removed(&self, key: &K, value: &Arc<V>) {
        let listeners = self.listeners.read().expect("listener lock poisoned");
        fire_removed(&listeners, key, value);
    }

    /// Removes an entry without taking the mutation lock; callers hold it.
    fn remove_locked(&self, key: &K) {
        if let Some((key, entry)) = self.entries.remove(key) {
            self.used.fetch_sub(entry.size, Ordering::Relaxed);
            self.notify_removed(&key, &entry.value);
        }
    }

    /// Evicts oldest-first until usage is at or below the low-water mark and
    /// `required` additional units fit. Callers hold the mutation lock.
    fn evict_locked(&self, required: u64) {
        let mut candidates: Vec<(K, u64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_used.load(Ordering::Relaxed)))
            .collect();
        candidates.sort_by_key(|(_, stamp)| *stamp);

        let low_water = self.low_water.load(Ordering::Relaxed);
        for (key, _) in candidates {
            let used = self.used.load(Ordering::Relaxed);
            if used <= low_water && used + required <= self.capacity {
                break;
            }
            self.remove_locked(&key);
        }
    }
}

impl<K, V> MemoryCache<K, V> for LruMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.get(key).map(|entry| {
            entry.last_used.store(self.stamp(), Ordering::Relaxed);
            entry.value.clone()
        })
    }

    fn add(&self, key: K, value: Arc<V>, size: u64) -> bool {
        if size == 0 {
            log::warn!("rejecting cache entry with non-positive size");
            return false;
        }
        if size > self.capacity {
            log::warn!(
                "rejecting cache entry of {size} units, capacity is {}",
                self.capacity
            );
            return false;
        }

        let _guard = self.mutation.lock().expect("cache lock poisoned");

        // Replacing an entry first removes the old one, listeners included.
        self.remove_locked(&key);

        if self.used.load(Ordering::Relaxed) + size > self.capacity {
            self.evict_locked(size);
        }

        self.used.fetch_add(size, Ordering::Relaxed);
        self.entries.insert(
            key,
            CacheEntry {
                value,
                size,
                last_used: AtomicU64::new(self.stamp()),
            },
        );
        true
    }

    fn remove(&self, key: &K) {
        let _guard = self.mutation.lock().expect("cache lock poisoned");
        self.remove_locked(key);
    }

    fn clear(&self) {
        let _guard = self.mutation.lock().expect("cache lock poisoned");
        let keys: Vec<K> = self.entries.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            self.remove_locked(&key);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn used_capacity(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }

    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn set_low_water(&self, low_water: u64) {
        if low_water < self.capacity {
            self.low_water.store(low_water, Ordering::Relaxed);
        }
    }

    fn add_listener(&self, listener: Arc<dyn RemovalListener<K, V>>) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;

    struct RecordingListener {
        removed: Mutex<Vec<&'static str>>,
        failures: AtomicUsize,
        fail: bool,
    }

    impl RecordingListener {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(RecordingListener {
                removed: Mutex::new(Vec::new()),
                failures: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl RemovalListener<&'static str, u32> for RecordingListener {
        fn entry_removed(
            &self,
            key: &&'static str,
            _value: &Arc<u32>,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.removed.lock().unwrap().push(key);
            if self.fail {
                return Err("listener failure".into());
            }
            Ok(())
        }

        fn removal_failed(
            &self,
            _key: &&'static str,
            _error: Box<dyn std::error::Error + Send + Sync>,
        ) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn rejects_oversized_and_empty_entries() {
        let cache: LruMemoryCache<&str, u32> = LruMemoryCache::new(10);
        assert!(!cache.add("a", Arc::new(1), 0));
        assert!(!cache.add("b", Arc::new(2), 11));
        assert!(cache.is_empty());
        assert_eq!(cache.used_capacity(), 0);
    }

    #[test]
    fn capacity_invariant_holds_after_eviction() {
        let cache: LruMemoryCache<&str, u32> = LruMemoryCache::new(10);
        cache.set_low_water(6);

        assert!(cache.add("a", Arc::new(1), 4));
        assert!(cache.add("b", Arc::new(2), 4));
        // Exceeds capacity, triggers an eviction pass.
        assert!(cache.add("c", Arc::new(3), 4));

        assert!(cache.used_capacity() <= 10);
        assert!(cache.used_capacity() <= 6 + 4);
    }

    #[test]
    fn evicts_least_recently_used_first() {
        let cache: LruMemoryCache<&str, u32> = LruMemoryCache::new(12);
        cache.set_low_water(4);
        let listener = RecordingListener::new(false);
        cache.add_listener(listener.clone());

        cache.add("a", Arc::new(1), 4);
        cache.add("b", Arc::new(2), 4);
        cache.add("c", Arc::new(3), 4);
        // "a" is the oldest by insertion but a hit refreshes it.
        cache.get(&"a");

        cache.add("d", Arc::new(4), 4);

        // Draining to the low-water mark removes the two stalest entries,
        // oldest first.
        let removed = listener.removed.lock().unwrap().clone();
        assert_eq!(removed, vec!["b", "c"]);
        assert!(cache.contains(&"a"));
        assert!(cache.contains(&"d"));
    }

    #[test]
    fn contains_does_not_refresh_recency() {
        let cache: LruMemoryCache<&str, u32> = LruMemoryCache::new(8);
        cache.set_low_water(4);

        cache.add("a", Arc::new(1), 4);
        cache.add("b", Arc::new(2), 4);
        assert!(cache.contains(&"a"));

        cache.add("c", Arc::new(3), 4);
        // "a" was only probed, never accessed, so it went first.
        assert!(!cache.contains(&"a"));
    }

    #[test]
    fn listener_failure_is_contained() {
        let cache: LruMemoryCache<&str, u32> = LruMemoryCache::new(10);
        let listener = RecordingListener::new(true);
        cache.add_listener(listener.clone());

        cache.add("a", Arc::new(1), 4);
        cache.remove(&"a");

        assert_eq!(listener.failures.load(Ordering::SeqCst), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.used_capacity(), 0);
    }

    #[test]
    fn replacing_an_entry_fires_removal_once() {
        let cache: LruMemoryCache<&str, u32> = LruMemoryCache::new(10);
        let listener = RecordingListener::new(false);
        cache.add_listener(listener.clone());

        cache.add("a", Arc::new(1), 4);
        cache.add("a", Arc::new(2), 4);

        assert_eq!(listener.removed.lock().unwrap().len(), 1);
        assert_eq!(cache.used_capacity(), 4);
        assert_eq!(*cache.get(&"a").unwrap(), 2);
    }

    #[test]
    fn clear_empties_and_notifies() {
        let cache: LruMemoryCache<&str, u32> = LruMemoryCache::new(10);
        let listener = RecordingListener::new(false);
        cache.add_listener(listener.clone());

        cache.add("a", Arc::new(1), 2);
        cache.add("b", Arc::new(2), 2);
        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.used_capacity(), 0);
        assert_eq!(listener.removed.lock().unwrap().len(), 2);
    }
}
