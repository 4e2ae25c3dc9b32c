//! Quad-tree level geometry and the absent-tile registry.

use std::time::{Duration, Instant, SystemTime};

use dashmap::DashMap;

use crate::config::ElevationModelConfig;
use crate::coords::{
    column_longitude, compute_column, compute_row, row_latitude, LatLon, Sector, TileKey,
};
use crate::error::ConfigError;

/// One refinement step of the quad tree. Tile deltas halve and texel size
/// strictly decreases as the level number increases.
#[derive(Clone, Debug)]
pub struct Level {
    pub number: u32,
    pub tile_delta_lat: f64,
    pub tile_delta_lon: f64,
    pub tile_width: usize,
    pub tile_height: usize,
    pub cache_name: String,
    /// Tiles older than this are refreshed in the background when used.
    pub expiry: Option<SystemTime>,
    /// The level intentionally has no data at all (e.g. ocean-only levels).
    pub empty: bool,
}

impl Level {
    /// Angular size of one elevation sample at this level, in degrees.
    pub fn texel_size(&self) -> f64 {
        self.tile_delta_lat / (self.tile_height - 1) as f64
    }
}

/// The row/column rectangle of tiles covering a sector at one level.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TileRect {
    pub first_row: u32,
    pub last_row: u32,
    pub first_column: u32,
    pub last_column: u32,
}

impl TileRect {
    pub fn iter(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        (self.first_row..=self.last_row).flat_map(move |row| {
            (self.first_column..=self.last_column).map(move |column| (row, column))
        })
    }

    pub fn count(&self) -> usize {
        let rows = (self.last_row - self.first_row + 1) as usize;
        let columns = (self.last_column - self.first_column + 1) as usize;
        rows * columns
    }
}

/// Describes the full quad-tree geometry of one model: the ordered level
/// sequence, the coverage sector, the tile origin, and the registry of tiles
/// known to be missing.
pub struct LevelSet {
    sector: Sector,
    origin: LatLon,
    levels: Vec<Level>,
    absent: AbsentTileList,
}

impl LevelSet {
    pub fn from_config(config: &ElevationModelConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let (mut delta_lat, mut delta_lon) = config.level_zero_tile_delta;
        let mut levels = Vec::with_capacity(config.num_levels as usize);
        for number in 0..config.num_levels {
            levels.push(Level {
                number,
                tile_delta_lat: delta_lat,
                tile_delta_lon: delta_lon,
                tile_width: config.tile_width,
                tile_height: config.tile_height,
                cache_name: config.cache_name.clone(),
                expiry: config.expiry,
                empty: config.empty_levels.contains(&number),
            });
            delta_lat /= 2.0;
            delta_lon /= 2.0;
        }

        Ok(LevelSet {
            sector: config.coverage,
            origin: config.origin,
            levels,
            absent: AbsentTileList::new(config.absent_max_tries, config.absent_retry_interval),
        })
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn origin(&self) -> LatLon {
        self.origin
    }

    pub fn num_levels(&self) -> u32 {
        self.levels.len() as u32
    }

    pub fn level(&self, number: u32) -> Option<&Level> {
        self.levels.get(number as usize)
    }

    pub fn first_level(&self) -> &Level {
        &self.levels[0]
    }

    pub fn last_level(&self) -> &Level {
        self.levels.last().expect("level set is never empty")
    }

    /// Marks a level as intentionally dataless. Fallback searches terminate
    /// at empty levels instead of requesting nonexistent tiles.
    pub fn set_empty_level(&mut self, number: u32) {
        if let Some(level) = self.levels.get_mut(number as usize) {
            level.empty = true;
        }
    }

    /// Selects the level serving `target_resolution` degrees per sample: the
    /// coarsest level whose texel size meets the target, or the finest level
    /// as a best effort when even it is too coarse.
    pub fn target_level(&self, target_resolution: f64) -> &Level {
        if self.last_level().texel_size() >= target_resolution {
            return self.last_level();
        }

        self.levels
            .iter()
            .find(|level| level.texel_size() <= target_resolution)
            .unwrap_or_else(|| self.last_level())
    }

    pub fn tile_key(&self, level: u32, row: u32, column: u32) -> TileKey {
        TileKey::new(level, row, column, self.levels[level as usize].cache_name.clone())
    }

    /// The sector covered by the tile at (level, row, column).
    pub fn tile_sector(&self, level: &Level, row: u32, column: u32) -> Sector {
        let min_lat = row_latitude(row, level.tile_delta_lat, self.origin.latitude);
        let min_lon = column_longitude(column, level.tile_delta_lon, self.origin.longitude);
        Sector::new(
            min_lat,
            min_lat + level.tile_delta_lat,
            min_lon,
            min_lon + level.tile_delta_lon,
        )
    }

    /// The rectangle of tiles at `level` covering `sector`, clamped to the
    /// coverage sector.
    pub fn tile_rect(&self, level: &Level, sector: &Sector) -> Option<TileRect> {
        let clamped = sector.intersection(&self.sector)?;

        let first_row = compute_row(
            level.tile_delta_lat,
            clamped.min_latitude,
            self.origin.latitude,
        );
        let last_row = compute_row(
            level.tile_delta_lat,
            clamped.max_latitude,
            self.origin.latitude,
        );
        let first_column = compute_column(
            level.tile_delta_lon,
            clamped.min_longitude,
            self.origin.longitude,
        );
        let last_column = compute_column(
            level.tile_delta_lon,
            clamped.max_longitude,
            self.origin.longitude,
        );

        Some(TileRect {
            first_row,
            last_row: last_row.max(first_row),
            first_column,
            last_column: last_column.max(first_column),
        })
    }

    pub fn absent_tiles(&self) -> &AbsentTileList {
        &self.absent
    }
}

#[derive(Clone, Copy, Debug)]
struct AbsentEntry {
    tries: u32,
    first_miss: Instant,
}

/// Registry of tiles known to be missing or failing, with a retry backoff.
///
/// Mutated concurrently by the query path (on miss) and by loader tasks (on
/// failure and success). Append/overwrite semantics are sufficient here: a
/// stale read only costs one redundant retrieval attempt.
pub struct AbsentTileList {
    entries: DashMap<TileKey, AbsentEntry>,
    max_tries: u32,
    retry_interval: Duration,
}

impl AbsentTileList {
    pub fn new(max_tries: u32, retry_interval: Duration) -> Self {
        AbsentTileList {
            entries: DashMap::new(),
            max_tries: max_tries.max(1),
            retry_interval,
        }
    }

    /// Records one failed attempt for `key`.
    pub fn mark_absent(&self, key: &TileKey) {
        let now = Instant::now();
        self.entries
            .entry(key.clone())
            .and_modify(|entry| entry.tries += 1)
            .or_insert(AbsentEntry {
                tries: 1,
                first_miss: now,
            });
    }

    /// Whether requests for `key` should currently be suppressed. Entries
    /// whose backoff has elapsed are cleared and report not-absent, allowing
    /// a retry.
    pub fn is_absent(&self, key: &TileKey) -> bool {
        let expired = match self.entries.get(key) {
            None => return false,
            Some(entry) => {
                if entry.first_miss.elapsed() < self.retry_interval {
                    return entry.tries >= self.max_tries;
                }
                true
            }
        };

        if expired {
            self.entries.remove(key);
        }
        false
    }

    /// Clears any absence record, typically after a successful load.
    pub fn unmark(&self, key: &TileKey) {
        self.entries.remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> ElevationModelConfig {
        let mut config = ElevationModelConfig::global("dem");
        config.num_levels = 4;
        config.level_zero_tile_delta = (45.0, 45.0);
        config.tile_width = 31;
        config.tile_height = 31;
        config
    }

    #[test]
    fn texel_size_strictly_decreases() {
        let levels = LevelSet::from_config(&test_config()).unwrap();
        for number in 1..levels.num_levels() {
            let coarser = levels.level(number - 1).unwrap();
            let finer = levels.level(number).unwrap();
            assert!(finer.texel_size() < coarser.texel_size());
            assert_eq!(finer.tile_delta_lat, coarser.tile_delta_lat / 2.0);
        }
    }

    #[test]
    fn target_level_picks_coarsest_sufficient() {
        let levels = LevelSet::from_config(&test_config()).unwrap();
        let level0 = levels.level(0).unwrap();
        let level1 = levels.level(1).unwrap();

        // Exactly level 1's texel size: level 1 serves it.
        assert_eq!(levels.target_level(level1.texel_size()).number, 1);
        // Coarser than level 0: level 0 still serves it.
        assert_eq!(levels.target_level(level0.texel_size() * 4.0).number, 0);
        // Finer than anything available: best effort with the finest level.
        assert_eq!(
            levels.target_level(1e-9).number,
            levels.last_level().number
        );
    }

    #[test]
    fn tile_rect_covers_sector() {
        let levels = LevelSet::from_config(&test_config()).unwrap();
        let level = levels.level(0).unwrap();

        let sector = Sector::new(10.0, 20.0, 10.0, 20.0);
        let rect = levels.tile_rect(level, &sector).unwrap();

        for (row, column) in rect.iter() {
            let tile_sector = levels.tile_sector(level, row, column);
            assert_ne!(
                tile_sector.intersects(&sector),
                crate::coords::Overlap::Disjoint
            );
        }
        // Sector spans 100..=110 degrees of grid offset on both axes.
        assert_eq!(rect.first_row, 2);
        assert_eq!(rect.last_row, 2);
        assert_eq!(rect.count(), 1);
    }

    #[test]
    fn tile_rect_count_survives_wide_rectangles() {
        // A global-extent rectangle at a deep level exceeds u32::MAX tiles.
        let rect = TileRect {
            first_row: 0,
            last_row: 99_999,
            first_column: 0,
            last_column: 99_999,
        };
        assert_eq!(rect.count(), 10_000_000_000);
    }

    #[test]
    fn tile_rect_outside_coverage_is_none() {
        let mut config = test_config();
        config.coverage = Sector::new(0.0, 45.0, 0.0, 45.0);
        config.origin = LatLon::new(0.0, 0.0);
        let levels = LevelSet::from_config(&config).unwrap();
        let level = levels.level(0).unwrap();

        let outside = Sector::new(-40.0, -30.0, -40.0, -30.0);
        assert!(levels.tile_rect(level, &outside).is_none());
    }

    #[test]
    fn absent_list_backoff() {
        let list = AbsentTileList::new(2, Duration::from_secs(3600));
        let key = TileKey::new(0, 0, 0, "dem");

        assert!(!list.is_absent(&key));
        list.mark_absent(&key);
        // One failure, below max tries: retries are still allowed.
        assert!(!list.is_absent(&key));
        list.mark_absent(&key);
        assert!(list.is_absent(&key));

        list.unmark(&key);
        assert!(!list.is_absent(&key));
    }

    #[test]
    fn absent_list_expires() {
        let list = AbsentTileList::new(1, Duration::from_millis(0));
        let key = TileKey::new(0, 0, 0, "dem");

        list.mark_absent(&key);
        // Zero backoff: the entry expires immediately and is cleared.
        assert!(!list.is_absent(&key));
        assert!(list.is_empty());
    }
}
