//! Capacity-bounded concurrent key/value caches for decoded tiles.
//!
//! Two interchangeable strategies implement the same capability set: an
//! explicit LRU with byte-accurate bookkeeping ([`LruMemoryCache`]) and a
//! reclaimable variant that trades deterministic ordering for cheaper
//! bookkeeping ([`ReclaimMemoryCache`]). Both fire the same removal-listener
//! contract, so upstream bookkeeping behaves identically regardless of which
//! strategy backs a given cache instance.

use std::hash::Hash;
use std::sync::Arc;

mod lru;
mod reclaim;

pub use lru::LruMemoryCache;
pub use reclaim::ReclaimMemoryCache;

/// Observes entry removals, whatever their reason (explicit removal, LRU
/// eviction or reclamation).
pub trait RemovalListener<K, V>: Send + Sync {
    /// Fired exactly once per removed entry.
    fn entry_removed(
        &self,
        key: &K,
        value: &Arc<V>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Fired when this listener's own `entry_removed` failed. The failure is
    /// never propagated into cache bookkeeping.
    fn removal_failed(&self, _key: &K, _error: Box<dyn std::error::Error + Send + Sync>) {}
}

/// A concurrent key/value cache bounded in declared size units.
///
/// Lookups are lock-free; mutations serialize on an internal lock that only
/// ever guards in-memory work.
pub trait MemoryCache<K, V>: Send + Sync
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Whether `key` is present. Does not update recency.
    fn contains(&self, key: &K) -> bool;

    /// Looks up `key`, updating its recency on a hit.
    fn get(&self, key: &K) -> Option<Arc<V>>;

    /// Adds an entry of `size` cache units. Returns whether the entry was
    /// accepted; rejections (non-positive or over-capacity sizes) are logged
    /// and the caller proceeds without caching.
    fn add(&self, key: K, value: Arc<V>, size: u64) -> bool;

    fn remove(&self, key: &K);

    fn clear(&self);

    /// Best-effort count of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of live entry sizes, or an entry count for strategies without
    /// byte bookkeeping.
    fn used_capacity(&self) -> u64;

    fn capacity(&self) -> u64;

    /// Target usage evictions drain down to.
    fn set_low_water(&self, low_water: u64);

    fn add_listener(&self, listener: Arc<dyn RemovalListener<K, V>>);
}

/// Invokes every listener for a removed entry, routing listener failures to
/// the listener's own failure hook.
pub(crate) fn fire_removed<K, V>(
    listeners: &[Arc<dyn RemovalListener<K, V>>],
    key: &K,
    value: &Arc<V>,
) {
    for listener in listeners {
        if let Err(error) = listener.entry_removed(key, value) {
            listener.removal_failed(key, error);
        }
    }
}
