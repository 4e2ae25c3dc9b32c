//! The engine context: every process-wide collaborator, injected explicitly.
//!
//! There are no global singletons; constructing two models with two contexts
//! yields two fully isolated engines, which is what the tests do.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::cache::MemoryCache;
use crate::coords::TileKey;
use crate::io::scheduler::Scheduler;
use crate::tile::ElevationTile;

/// Shared cache handle for decoded tiles.
pub type TileCache = Arc<dyn MemoryCache<TileKey, ElevationTile>>;

pub struct EngineContext {
    tile_cache: TileCache,
    scheduler: Arc<dyn Scheduler>,
    network_enabled: AtomicBool,
}

impl EngineContext {
    pub fn new(tile_cache: TileCache, scheduler: Arc<dyn Scheduler>, network_enabled: bool) -> Self {
        EngineContext {
            tile_cache,
            scheduler,
            network_enabled: AtomicBool::new(network_enabled),
        }
    }

    pub fn tile_cache(&self) -> &TileCache {
        &self.tile_cache
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Whether background retrieval may currently be scheduled. Flipping
    /// this off mid-flight only suppresses new requests; tasks already
    /// running finish and populate the cache harmlessly.
    pub fn is_network_enabled(&self) -> bool {
        self.network_enabled.load(Ordering::Relaxed)
    }

    pub fn set_network_enabled(&self, enabled: bool) {
        self.network_enabled.store(enabled, Ordering::Relaxed);
    }
}
