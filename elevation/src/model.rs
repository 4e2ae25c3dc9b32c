//! The elevation model: resolution selection, cache consultation and
//! resolution-degraded fallback.
//!
//! The sampling path never blocks on I/O. A cache miss immediately yields
//! the best coarser data available (or the model's static extreme bound)
//! while the ideal tile is scheduled for background retrieval.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use crate::config::ElevationModelConfig;
use crate::context::EngineContext;
use crate::coords::{compute_column, compute_row, LatLon, Overlap, Sector, TileKey};
use crate::error::{ConfigError, TimeoutError};
use crate::extremes::ExtremesIndex;
use crate::io::loader::TileLoader;
use crate::io::source::ElevationSource;
use crate::level::LevelSet;
use crate::tile::{Elevations, Resolution};

pub struct ElevationModel<S: ElevationSource> {
    config: Arc<ElevationModelConfig>,
    levels: Arc<LevelSet>,
    context: Arc<EngineContext>,
    loader: Arc<TileLoader<S>>,
    extremes: RwLock<Option<ExtremesIndex>>,
}

impl<S: ElevationSource> ElevationModel<S> {
    /// Builds a model from a validated configuration. Misconfiguration is
    /// the only hard construction failure; a missing or malformed extremes
    /// file degrades to the declared elevation bounds with a warning.
    pub fn new(
        config: ElevationModelConfig,
        context: Arc<EngineContext>,
        source: S,
    ) -> Result<Self, ConfigError> {
        let levels = Arc::new(LevelSet::from_config(&config)?);
        let config = Arc::new(config);
        let loader = Arc::new(TileLoader::new(
            context.clone(),
            Arc::new(source),
            levels.clone(),
            config.clone(),
        ));

        let extremes = match &config.extremes_path {
            Some(path) => match ExtremesIndex::load(path, &levels) {
                Ok(index) => Some(index),
                Err(error) => {
                    log::warn!(
                        "could not load extremes file {}: {error}",
                        path.display()
                    );
                    None
                }
            },
            None => None,
        };

        Ok(ElevationModel {
            config,
            levels,
            context,
            loader,
            extremes: RwLock::new(extremes),
        })
    }

    pub fn config(&self) -> &ElevationModelConfig {
        &self.config
    }

    pub fn levels(&self) -> &LevelSet {
        &self.levels
    }

    pub fn context(&self) -> &Arc<EngineContext> {
        &self.context
    }

    /// Registers a change listener fired whenever backing tile data
    /// changes; consumers re-sample on notification.
    pub fn add_tile_listener(&self, listener: impl Fn(&TileKey) + Send + Sync + 'static) {
        self.loader.add_listener(listener);
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.levels.sector().contains(latitude, longitude)
    }

    pub fn intersects(&self, sector: &Sector) -> Overlap {
        self.levels.sector().intersects(sector)
    }

    /// (Re)loads the extremes index, discarding the derived-results cache.
    pub fn load_extremes(&self, path: &Path) -> Result<(), crate::error::ExtremesError> {
        let index = ExtremesIndex::load(path, &self.levels)?;
        *self.extremes.write().expect("extremes lock poisoned") = Some(index);
        Ok(())
    }

    /// The precomputed [min, max] bound over `sector`, falling back to the
    /// declared model bounds when no extremes index is loaded.
    pub fn get_extreme_elevations(&self, sector: &Sector) -> (f64, f64) {
        let guard = self.extremes.read().expect("extremes lock poisoned");
        guard
            .as_ref()
            .and_then(|index| index.extremes_over(sector))
            .unwrap_or((self.config.min_elevation, self.config.max_elevation))
    }

    /// The precomputed [min, max] bound for the single tile containing a
    /// point.
    pub fn get_extreme_elevations_at(&self, latitude: f64, longitude: f64) -> (f64, f64) {
        let guard = self.extremes.read().expect("extremes lock poisoned");
        guard
            .as_ref()
            .and_then(|index| index.extremes_at(latitude, longitude))
            .unwrap_or((self.config.min_elevation, self.config.max_elevation))
    }

    /// Samples elevations for `locations` into `out`, substituting the
    /// configured replacement for missing-data sentinels. Slots for
    /// locations outside the requested sector or model coverage are left
    /// untouched. Returns the resolution actually achieved.
    pub fn get_elevations(
        &self,
        sector: &Sector,
        locations: &[LatLon],
        target_resolution: f64,
        out: &mut [f64],
    ) -> Resolution {
        self.sample_elevations(sector, locations, target_resolution, out, true)
    }

    /// Like [`ElevationModel::get_elevations`] but leaves gaps: sentinel
    /// values pass through unmapped, and locations no tile covers receive
    /// the sentinel instead of the extreme-bound estimate.
    pub fn get_unmapped_elevations(
        &self,
        sector: &Sector,
        locations: &[LatLon],
        target_resolution: f64,
        out: &mut [f64],
    ) -> Resolution {
        self.sample_elevations(sector, locations, target_resolution, out, false)
    }

    fn sample_elevations(
        &self,
        sector: &Sector,
        locations: &[LatLon],
        target_resolution: f64,
        out: &mut [f64],
        mapped: bool,
    ) -> Resolution {
        assert!(
            out.len() >= locations.len(),
            "output buffer shorter than location list"
        );
        assert!(
            target_resolution > 0.0,
            "target resolution must be positive"
        );

        let Some(clamped) = sector.intersection(self.levels.sector()) else {
            return Resolution::NoData;
        };

        let elevations = self.resolve(&clamped, target_resolution);
        let sentinel = self.config.missing_data_sentinel;

        for (slot, location) in out.iter_mut().zip(locations) {
            if !clamped.contains(location.latitude, location.longitude) {
                continue;
            }
            match elevations.elevation(location.latitude, location.longitude) {
                Some(value) if value == sentinel => {
                    *slot = if mapped {
                        self.config.missing_data_replacement
                    } else {
                        sentinel
                    };
                }
                Some(value) => *slot = value,
                // No covering tile at all: bound the point rather than
                // leaving the slot untouched.
                None => {
                    *slot = if mapped {
                        self.get_extreme_elevations(&clamped).0
                    } else {
                        sentinel
                    };
                }
            }
        }

        elevations.achieved
    }

    /// The elevation at one location from cached data only. Walks levels
    /// finest to coarsest and never schedules retrieval; for callers that
    /// must not block or initiate I/O.
    pub fn get_unmapped_local_source_elevation(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Option<f64> {
        if !self.contains(latitude, longitude) {
            return None;
        }

        let sentinel = self.config.missing_data_sentinel;
        for number in (0..self.levels.num_levels()).rev() {
            let level = self.levels.level(number)?;
            if level.empty {
                continue;
            }
            let row = compute_row(level.tile_delta_lat, latitude, self.levels.origin().latitude);
            let column = compute_column(
                level.tile_delta_lon,
                longitude,
                self.levels.origin().longitude,
            );
            let key = self.levels.tile_key(number, row, column);
            if let Some(tile) = self.context.tile_cache().get(&key) {
                if let Some(value) = tile.sample(latitude, longitude, sentinel) {
                    return Some(value);
                }
            }
        }
        None
    }

    /// Collects the best currently-cached tiles covering `sector` at
    /// `target_resolution`, scheduling background loads for everything
    /// missing. Never blocks.
    pub fn resolve(&self, sector: &Sector, target_resolution: f64) -> Elevations {
        let sentinel = self.config.missing_data_sentinel;
        let level = self.levels.target_level(target_resolution);

        let Some(rect) = self.levels.tile_rect(level, sector) else {
            return Elevations::new(Vec::new(), Resolution::NoData, sentinel);
        };

        // Requests deduplicated within this call only; cross-call
        // duplicates are tolerated as idempotent no-ops in the loader.
        let mut requested: HashSet<TileKey> = HashSet::new();
        let mut tiles = Vec::with_capacity(rect.count());
        let mut achieved = Resolution::NoData;

        for (row, column) in rect.iter() {
            let key = self.levels.tile_key(level.number, row, column);

            if let Some(tile) = self.context.tile_cache().get(&key) {
                if tile.has_samples() {
                    // Stale data still serves this query; expiry only
                    // triggers a background refresh.
                    if tile.is_expired(level.expiry) && requested.insert(key.clone()) {
                        self.loader.request(key);
                    }
                    achieved = achieved.coarsest(Resolution::Degrees(level.texel_size()));
                    tiles.push(tile);
                    continue;
                }
            }

            if !level.empty && requested.insert(key.clone()) {
                self.loader.request(key.clone());
            }

            // Walk ancestor levels for a resolution-degraded substitute.
            let mut found = false;
            for number in (0..level.number).rev() {
                let ancestor_level = self
                    .levels
                    .level(number)
                    .expect("ancestor levels always exist");
                if ancestor_level.empty {
                    // Declared-empty levels terminate the search; the
                    // extreme bound answers instead.
                    break;
                }
                let shift = level.number - number;
                let ancestor_key = self.levels.tile_key(number, row >> shift, column >> shift);
                if let Some(tile) = self.context.tile_cache().get(&ancestor_key) {
                    if tile.has_samples() {
                        // A stale substitute still serves this query, but
                        // any tile actually used gets a refresh.
                        if tile.is_expired(ancestor_level.expiry)
                            && requested.insert(ancestor_key.clone())
                        {
                            self.loader.request(ancestor_key);
                        }
                        achieved = achieved
                            .coarsest(Resolution::Degrees(ancestor_level.texel_size()));
                        tiles.push(tile);
                        found = true;
                        break;
                    }
                }
            }

            if !found && level.number > 0 {
                // Not even the root is resident; request it so future
                // queries can at least answer coarsely.
                let root_level = self.levels.first_level();
                if !root_level.empty {
                    let root_key =
                        self.levels
                            .tile_key(0, row >> level.number, column >> level.number);
                    if requested.insert(root_key.clone()) {
                        self.loader.request(root_key);
                    }
                }
            }
        }

        Elevations::new(tiles, achieved, sentinel)
    }

    /// Blocks until every tile covering `sector` at `target_resolution` is
    /// resident, then returns the resolved set. Used by bulk operations
    /// such as terrain intersection, never by per-frame sampling. Exceeding
    /// `timeout` with data still missing is a hard failure.
    pub async fn get_elevations_within(
        &self,
        sector: &Sector,
        target_resolution: f64,
        timeout: Duration,
    ) -> Result<Elevations, TimeoutError> {
        let deadline = Instant::now() + timeout;
        let level = self.levels.target_level(target_resolution);

        loop {
            let Some(rect) = self.levels.tile_rect(level, sector) else {
                return Ok(Elevations::new(
                    Vec::new(),
                    Resolution::NoData,
                    self.config.missing_data_sentinel,
                ));
            };

            let mut missing = false;
            for (row, column) in rect.iter() {
                let key = self.levels.tile_key(level.number, row, column);
                let resident = self
                    .context
                    .tile_cache()
                    .get(&key)
                    .map(|tile| tile.has_samples())
                    .unwrap_or(false);
                if !resident {
                    missing = true;
                    self.loader.request(key);
                }
            }

            if !missing {
                return Ok(self.resolve(sector, target_resolution));
            }
            if Instant::now() >= deadline {
                return Err(TimeoutError(timeout));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}
