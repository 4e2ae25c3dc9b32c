//! The asynchronous tile loader.
//!
//! Each tile key moves through Unrequested → Requested → Loaded or Absent.
//! Absent is not terminal: after its backoff elapses the key may be
//! requested again. There is no cancellation; a task finishing after its
//! result is no longer needed is a harmless cache population.

use std::sync::{Arc, RwLock};

use crate::config::ElevationModelConfig;
use crate::context::EngineContext;
use crate::coords::{Sector, TileKey};
use crate::error::DecodeError;
use crate::io::codec;
use crate::io::source::{ElevationSource, RawTile, TileFormat};
use crate::level::{Level, LevelSet};
use crate::tile::{ElevationTile, TileSamples};

type TileListener = Box<dyn Fn(&TileKey) + Send + Sync>;

pub struct TileLoader<S: ElevationSource> {
    context: Arc<EngineContext>,
    source: Arc<S>,
    levels: Arc<LevelSet>,
    config: Arc<ElevationModelConfig>,
    listeners: RwLock<Vec<TileListener>>,
}

impl<S: ElevationSource> TileLoader<S> {
    pub fn new(
        context: Arc<EngineContext>,
        source: Arc<S>,
        levels: Arc<LevelSet>,
        config: Arc<ElevationModelConfig>,
    ) -> Self {
        TileLoader {
            context,
            source,
            levels,
            config,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Registers a change listener, invoked with the key of every tile
    /// whose backing data changes. Consumers re-sample on notification.
    pub fn add_listener(&self, listener: impl Fn(&TileKey) + Send + Sync + 'static) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(Box::new(listener));
    }

    fn notify(&self, key: &TileKey) {
        let listeners = self.listeners.read().expect("listener lock poisoned");
        for listener in listeners.iter() {
            listener(key);
        }
    }

    /// Enqueues a background load for `key`. Safe to call redundantly: an
    /// in-flight or already-loaded key turns the task into a no-op, and
    /// keys under an unexpired absence backoff are suppressed up front.
    pub fn request(self: &Arc<Self>, key: TileKey) {
        if !self.context.is_network_enabled() {
            return;
        }
        if self.levels.absent_tiles().is_absent(&key) {
            log::debug!("suppressing request for absent tile {key}");
            return;
        }
        if self.is_resident(&key) {
            return;
        }

        let loader = Arc::clone(self);
        let scheduled = self
            .context
            .scheduler()
            .schedule(Box::pin(async move { loader.run(key).await }));
        if let Err(error) = scheduled {
            log::warn!("could not schedule tile load: {error}");
        }
    }

    /// Whether a populated, unexpired tile for `key` is already cached.
    fn is_resident(&self, key: &TileKey) -> bool {
        let Some(level) = self.levels.level(key.level) else {
            return false;
        };
        match self.context.tile_cache().get(key) {
            Some(tile) => tile.has_samples() && !tile.is_expired(level.expiry),
            None => false,
        }
    }

    async fn run(&self, key: TileKey) {
        // Race guard: a duplicate concurrent request may have finished
        // between scheduling and now.
        if self.is_resident(&key) {
            return;
        }
        let Some(level) = self.levels.level(key.level) else {
            log::warn!("dropping request for unknown level: {key}");
            return;
        };
        let sector = self.levels.tile_sector(level, key.row, key.column);

        match self.source.retrieve(&key, &sector).await {
            Ok(raw) => match self.build_tile(&key, level, sector, raw) {
                // A decode failure is treated like a failed retrieval; no
                // partial tile is ever installed.
                Ok(tile) => self.install(&key, tile),
                Err(error) => self.fail(&key, &error.to_string()),
            },
            Err(error) => self.fail(&key, &error.to_string()),
        }
    }

    fn build_tile(
        &self,
        key: &TileKey,
        level: &Level,
        sector: Sector,
        raw: RawTile,
    ) -> Result<ElevationTile, DecodeError> {
        let sentinel = self.config.missing_data_sentinel;
        match raw.format {
            TileFormat::RawBinary => {
                let expected = level.tile_width * level.tile_height;
                let values = codec::decode_raw(
                    &raw.bytes,
                    self.config.data_type,
                    self.config.byte_order,
                    expected,
                )?;
                Ok(ElevationTile::new(
                    sector,
                    key.level,
                    key.row,
                    key.column,
                    level.tile_width,
                    level.tile_height,
                    level.texel_size(),
                )
                .with_samples(TileSamples::new(values, sentinel)))
            }
            TileFormat::GeoTiff => {
                // The raster's own georeferencing wins over level geometry.
                let gridded = codec::decode_geotiff(&raw.bytes)?;
                let texel = gridded.sector.delta_lat() / (gridded.height - 1).max(1) as f64;
                Ok(ElevationTile::new(
                    gridded.sector,
                    key.level,
                    key.row,
                    key.column,
                    gridded.width,
                    gridded.height,
                    texel,
                )
                .with_samples(TileSamples::new(gridded.samples, sentinel)))
            }
        }
    }

    fn install(&self, key: &TileKey, tile: ElevationTile) {
        let size = (tile.tile_width * tile.tile_height * std::mem::size_of::<f64>()) as u64;
        let accepted = self
            .context
            .tile_cache()
            .add(key.clone(), Arc::new(tile), size);
        if !accepted {
            log::warn!("tile {key} was not cached; it will be re-retrieved on demand");
        }
        self.levels.absent_tiles().unmark(key);
        self.notify(key);
        log::debug!("loaded tile {key}");
    }

    fn fail(&self, key: &TileKey, reason: &str) {
        self.levels.absent_tiles().mark_absent(key);
        log::debug!("marking tile {key} absent: {reason}");
    }
}
