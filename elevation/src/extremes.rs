//! Precomputed extreme-elevation index.
//!
//! A flat array of [min, max] pairs for every tile at one designated level
//! of the quad tree, loaded from a binary file whose name encodes the level.
//! Used to bound geometry over regions whose exact tiles are not resident
//! yet. Immutable after load; a small sector-keyed result cache amortizes
//! repeated region queries and is discarded wholesale on reload.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Mutex;

use crate::coords::{compute_column, compute_row, LatLon, Sector};
use crate::error::ExtremesError;
use crate::io::codec;
use crate::level::LevelSet;

/// Quantized sector bounds; memo key for region queries.
type SectorKey = (u64, u64, u64, u64);

fn sector_key(sector: &Sector) -> SectorKey {
    (
        sector.min_latitude.to_bits(),
        sector.max_latitude.to_bits(),
        sector.min_longitude.to_bits(),
        sector.max_longitude.to_bits(),
    )
}

pub struct ExtremesIndex {
    level_number: u32,
    tile_delta_lat: f64,
    tile_delta_lon: f64,
    origin: LatLon,
    coverage: Sector,
    rows: u32,
    columns: u32,
    /// [min, max] per tile, row-major by (row, column).
    pairs: Vec<(i16, i16)>,
    sector_cache: Mutex<HashMap<SectorKey, (f64, f64)>>,
}

impl ExtremesIndex {
    /// Loads an extremes file. The source level is encoded as the trailing
    /// digits of the file stem (for example `dem_extremes_2.bpe` → level 2).
    pub fn load(path: &Path, levels: &LevelSet) -> Result<Self, ExtremesError> {
        let level_number = level_from_filename(path)?;
        let level = levels
            .level(level_number)
            .ok_or(ExtremesError::UnknownLevel {
                level: level_number,
            })?;

        let rect = levels
            .tile_rect(level, levels.sector())
            .expect("coverage sector covers itself");
        let rows = rect.last_row - rect.first_row + 1;
        let columns = rect.last_column - rect.first_column + 1;

        let pairs = codec::read_extremes(BufReader::new(File::open(path)?))?;
        let expected = (rows * columns) as usize;
        if pairs.len() != expected {
            return Err(ExtremesError::LengthMismatch {
                expected,
                actual: pairs.len(),
            });
        }

        Ok(ExtremesIndex {
            level_number,
            tile_delta_lat: level.tile_delta_lat,
            tile_delta_lon: level.tile_delta_lon,
            origin: levels.origin(),
            coverage: *levels.sector(),
            rows,
            columns,
            pairs,
            sector_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn level_number(&self) -> u32 {
        self.level_number
    }

    fn pair_at(&self, row: u32, column: u32) -> (i16, i16) {
        self.pairs[(row * self.columns + column) as usize]
    }

    /// The [min, max] bound for the tile containing a single point. O(1),
    /// no caching needed.
    pub fn extremes_at(&self, latitude: f64, longitude: f64) -> Option<(f64, f64)> {
        if !self.coverage.contains(latitude, longitude) {
            return None;
        }
        let row = compute_row(self.tile_delta_lat, latitude, self.origin.latitude)
            .min(self.rows - 1);
        let column = compute_column(self.tile_delta_lon, longitude, self.origin.longitude)
            .min(self.columns - 1);
        let (min, max) = self.pair_at(row, column);
        Some((min as f64, max as f64))
    }

    /// The [min, max] bound folded over every tile covering `sector`,
    /// memoized per sector.
    pub fn extremes_over(&self, sector: &Sector) -> Option<(f64, f64)> {
        let clamped = sector.intersection(&self.coverage)?;
        let key = sector_key(&clamped);

        if let Some(&cached) = self
            .sector_cache
            .lock()
            .expect("extremes cache poisoned")
            .get(&key)
        {
            return Some(cached);
        }

        let first_row = compute_row(self.tile_delta_lat, clamped.min_latitude, self.origin.latitude)
            .min(self.rows - 1);
        let last_row = compute_row(self.tile_delta_lat, clamped.max_latitude, self.origin.latitude)
            .min(self.rows - 1);
        let first_column =
            compute_column(self.tile_delta_lon, clamped.min_longitude, self.origin.longitude)
                .min(self.columns - 1);
        let last_column =
            compute_column(self.tile_delta_lon, clamped.max_longitude, self.origin.longitude)
                .min(self.columns - 1);

        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for row in first_row..=last_row {
            for column in first_column..=last_column {
                let (tile_min, tile_max) = self.pair_at(row, column);
                min = min.min(tile_min as f64);
                max = max.max(tile_max as f64);
            }
        }

        self.sector_cache
            .lock()
            .expect("extremes cache poisoned")
            .insert(key, (min, max));
        Some((min, max))
    }
}

fn level_from_filename(path: &Path) -> Result<u32, ExtremesError> {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits
        .parse()
        .map_err(|_| ExtremesError::NoLevelInFilename(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::ElevationModelConfig;

    fn test_levels() -> LevelSet {
        let mut config = ElevationModelConfig::global("dem");
        config.num_levels = 3;
        config.level_zero_tile_delta = (90.0, 90.0);
        config.tile_width = 5;
        config.tile_height = 5;
        LevelSet::from_config(&config).unwrap()
    }

    /// Writes an extremes file for level 1 (4 rows x 8 columns globally)
    /// where tile (row, col) holds [base, base + 10] with base = row * 100 +
    /// col.
    fn write_test_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("dem_extremes_1.bpe");
        let mut pairs = Vec::new();
        for row in 0..4i16 {
            for col in 0..8i16 {
                let base = row * 100 + col;
                pairs.push((base, base + 10));
            }
        }
        let mut bytes = Vec::new();
        codec::write_extremes(&mut bytes, &pairs).unwrap();
        File::create(&path).unwrap().write_all(&bytes).unwrap();
        path
    }

    #[test]
    fn level_parsed_from_filename() {
        assert_eq!(
            level_from_filename(Path::new("/data/srtm_extremes_12.bpe")).unwrap(),
            12
        );
        assert!(level_from_filename(Path::new("/data/extremes.bpe")).is_err());
    }

    #[test]
    fn round_trip_every_cell() {
        let dir = tempfile::tempdir().unwrap();
        let levels = test_levels();
        let index = ExtremesIndex::load(&write_test_file(dir.path()), &levels).unwrap();
        assert_eq!(index.level_number(), 1);

        // Level 1 tiles are 45 degrees; probe the center of every tile.
        for row in 0..4u32 {
            for col in 0..8u32 {
                let latitude = -90.0 + row as f64 * 45.0 + 22.5;
                let longitude = -180.0 + col as f64 * 45.0 + 22.5;
                let expected = (row * 100 + col) as f64;
                assert_eq!(
                    index.extremes_at(latitude, longitude),
                    Some((expected, expected + 10.0))
                );
            }
        }
    }

    #[test]
    fn folds_over_sector() {
        let dir = tempfile::tempdir().unwrap();
        let levels = test_levels();
        let index = ExtremesIndex::load(&write_test_file(dir.path()), &levels).unwrap();

        // Covers tiles (0,0), (0,1), (1,0), (1,1): min 0, max 101 + 10.
        let sector = Sector::new(-80.0, -10.0, -170.0, -100.0);
        assert_eq!(index.extremes_over(&sector), Some((0.0, 111.0)));
        // Second query hits the memo; same result.
        assert_eq!(index.extremes_over(&sector), Some((0.0, 111.0)));
    }

    #[test]
    fn rejects_wrong_length() {
        let dir = tempfile::tempdir().unwrap();
        let levels = test_levels();
        let path = dir.path().join("dem_extremes_1.bpe");
        let mut bytes = Vec::new();
        codec::write_extremes(&mut bytes, &[(0, 1); 3]).unwrap();
        File::create(&path).unwrap().write_all(&bytes).unwrap();

        assert!(matches!(
            ExtremesIndex::load(&path, &levels),
            Err(ExtremesError::LengthMismatch { .. })
        ));
    }
}
