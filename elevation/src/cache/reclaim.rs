//! Reclaimable cache variant.
//!
//! Emulates a cache backed by runtime-reclaimable ("soft") references:
//! entries may disappear under memory pressure at any time, independent of
//! strict LRU ordering. There is no byte bookkeeping; the bound is an entry
//! count, and pressure triggers a randomized early eviction biased toward
//! stale entries. Removal listeners fire exactly as in the LRU variant, so
//! upstream bookkeeping cannot tell the strategies apart.

use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use dashmap::DashMap;
use rand::Rng;

use super::{fire_removed, MemoryCache, RemovalListener};

struct ReclaimEntry<V> {
    value: Arc<V>,
    last_used: AtomicU64,
}

pub struct ReclaimMemoryCache<K, V>
where
    K: Eq + Hash,
{
    entries: DashMap<K, ReclaimEntry<V>>,
    clock: AtomicU64,
    max_entries: usize,
    mutation: Mutex<()>,
    listeners: RwLock<Vec<Arc<dyn RemovalListener<K, V>>>>,
}

impl<K, V> ReclaimMemoryCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(max_entries: usize) -> Self {
        assert!(max_entries > 0, "cache capacity must be positive");
        ReclaimMemoryCache {
            entries: DashMap::new(),
            clock: AtomicU64::new(0),
            max_entries,
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

    fn remove_locked(&self, key: &K) {
        if let Some((key, entry)) = self.entries.remove(key) {
            self.notify_removed(&key, &entry.value);
        }
    }

    /// Reclaims entries until the count is strictly below the bound. Victims
    /// are drawn at random from the staler half of the cache, which is what
    /// a host memory manager reclaiming soft references looks like from the
    /// outside. Callers hold the mutation lock.
    fn reclaim_locked(&self) {
        let mut candidates: Vec<(K, u64)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().last_used.load(Ordering::Relaxed)))
            .collect();
        candidates.sort_by_key(|(_, stamp)| *stamp);
        candidates.truncate((candidates.len() / 2).max(1));

        let mut rng = rand::thread_rng();
        while self.entries.len() >= self.max_entries && !candidates.is_empty() {
            let victim = rng.gen_range(0..candidates.len());
            let (key, _) = candidates.swap_remove(victim);
            self.remove_locked(&key);
        }
    }
}

impl<K, V> MemoryCache<K, V> for ReclaimMemoryCache<K, V>
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

        let _guard = self.mutation.lock().expect("cache lock poisoned");

        self.remove_locked(&key);
        if self.entries.len() >= self.max_entries {
            self.reclaim_locked();
        }

        self.entries.insert(
            key,
            ReclaimEntry {
                value,
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

    /// Best-effort live entry count; this strategy has no byte bookkeeping.
    fn used_capacity(&self) -> u64 {
        self.entries.len() as u64
    }

    fn capacity(&self) -> u64 {
        self.max_entries as u64
    }

    fn set_low_water(&self, _low_water: u64) {
        log::debug!("reclaimable cache has no low-water mark");
    }

    fn add_listener(&self, listener: Arc<dyn RemovalListener<K, V>>) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }
}
