//! Decoded elevation tiles and per-query result sets.

use std::sync::OnceLock;
use std::sync::Arc;
use std::time::SystemTime;

use crate::coords::Sector;

/// The angular resolution actually achieved by a query.
///
/// A single sentinel convention is used everywhere: `NoData` means no tile
/// served any part of the query, never an infinity-valued resolution.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Degrees per sample of the coarsest level actually used.
    Degrees(f64),
    /// No data served any part of the query.
    NoData,
}

impl Resolution {
    pub fn is_no_data(&self) -> bool {
        matches!(self, Resolution::NoData)
    }

    /// Folds two achieved resolutions into the coarser of the two.
    pub fn coarsest(self, other: Resolution) -> Resolution {
        match (self, other) {
            (Resolution::NoData, other) => other,
            (this, Resolution::NoData) => this,
            (Resolution::Degrees(a), Resolution::Degrees(b)) => Resolution::Degrees(a.max(b)),
        }
    }
}

/// A tile's decoded sample buffer with its precomputed extremes.
#[derive(Clone, Debug)]
pub struct TileSamples {
    /// Row-major, south-to-north.
    pub values: Vec<f64>,
    pub min: f64,
    pub max: f64,
}

impl TileSamples {
    /// Wraps decoded samples, computing extremes over all non-sentinel
    /// values. An all-sentinel tile reports the sentinel as both extremes.
    pub fn new(values: Vec<f64>, missing_data_sentinel: f64) -> Self {
        let mut min = f64::MAX;
        let mut max = f64::MIN;
        for &value in &values {
            if value == missing_data_sentinel {
                continue;
            }
            min = min.min(value);
            max = max.max(value);
        }
        if min > max {
            min = missing_data_sentinel;
            max = missing_data_sentinel;
        }
        TileSamples { values, min, max }
    }
}

/// A single decoded elevation tile.
///
/// Created by the loader, then shared read-only through the memory cache.
/// A refreshed tile with the same key supersedes it wholesale; samples are
/// never mutated in place.
#[derive(Clone, Debug)]
pub struct ElevationTile {
    pub sector: Sector,
    pub level_number: u32,
    pub row: u32,
    pub column: u32,
    pub tile_width: usize,
    pub tile_height: usize,
    /// Degrees per sample at this tile's level.
    pub texel_size: f64,
    samples: Option<TileSamples>,
    pub updated: SystemTime,
}

impl ElevationTile {
    pub fn new(
        sector: Sector,
        level_number: u32,
        row: u32,
        column: u32,
        tile_width: usize,
        tile_height: usize,
        texel_size: f64,
    ) -> Self {
        ElevationTile {
            sector,
            level_number,
            row,
            column,
            tile_width,
            tile_height,
            texel_size,
            samples: None,
            updated: SystemTime::now(),
        }
    }

    /// The populated form of this tile, stamped now.
    pub fn with_samples(mut self, samples: TileSamples) -> Self {
        assert_eq!(
            samples.values.len(),
            self.tile_width * self.tile_height,
            "sample buffer does not match tile dimensions"
        );
        self.samples = Some(samples);
        self.updated = SystemTime::now();
        self
    }

    pub fn has_samples(&self) -> bool {
        self.samples.is_some()
    }

    pub fn samples(&self) -> Option<&TileSamples> {
        self.samples.as_ref()
    }

    /// Whether this tile predates the given expiry instant.
    pub fn is_expired(&self, expiry: Option<SystemTime>) -> bool {
        match expiry {
            Some(expiry) => self.updated < expiry,
            None => false,
        }
    }

    /// Extreme elevations over this tile's own samples.
    pub fn extremes(&self) -> Option<(f64, f64)> {
        self.samples.as_ref().map(|s| (s.min, s.max))
    }

    /// Bilinearly interpolates the elevation at (latitude, longitude).
    ///
    /// Returns `None` when the point is outside the tile or the tile has no
    /// samples yet. If any neighbor sample equals the missing-data sentinel
    /// the result is exactly the sentinel; interpolating across a data void
    /// would fabricate plausible-looking but wrong elevations.
    pub fn sample(&self, latitude: f64, longitude: f64, missing_data_sentinel: f64) -> Option<f64> {
        let samples = self.samples.as_ref()?;
        if !self.sector.contains(latitude, longitude) {
            return None;
        }

        let width = self.tile_width;
        let height = self.tile_height;

        // Fractional grid position; rows run south to north.
        let u = (longitude - self.sector.min_longitude) / self.sector.delta_lon()
            * (width - 1) as f64;
        let v = (latitude - self.sector.min_latitude) / self.sector.delta_lat()
            * (height - 1) as f64;

        let i0 = (u.floor() as usize).min(width - 1);
        let j0 = (v.floor() as usize).min(height - 1);
        // Degrades to 2 or 1 distinct samples at tile edges.
        let i1 = (i0 + 1).min(width - 1);
        let j1 = (j0 + 1).min(height - 1);

        let s00 = samples.values[j0 * width + i0];
        let s10 = samples.values[j0 * width + i1];
        let s01 = samples.values[j1 * width + i0];
        let s11 = samples.values[j1 * width + i1];

        if s00 == missing_data_sentinel
            || s10 == missing_data_sentinel
            || s01 == missing_data_sentinel
            || s11 == missing_data_sentinel
        {
            return Some(missing_data_sentinel);
        }

        let fu = u - i0 as f64;
        let fv = v - j0 as f64;

        let south = s00 + (s10 - s00) * fu;
        let north = s01 + (s11 - s01) * fu;
        Some(south + (north - south) * fv)
    }
}

/// The transient result of one region query: the covering tiles sorted
/// finest-first, plus the resolution actually achieved. Created per query
/// and discarded after the caller consumes it; never cached.
pub struct Elevations {
    tiles: Vec<Arc<ElevationTile>>,
    pub achieved: Resolution,
    missing_data_sentinel: f64,
    extremes: OnceLock<Option<(f64, f64)>>,
}

impl Elevations {
    pub fn new(
        mut tiles: Vec<Arc<ElevationTile>>,
        achieved: Resolution,
        missing_data_sentinel: f64,
    ) -> Self {
        // Finest level first so lookups prefer the best data available,
        // then row/column for deterministic iteration.
        tiles.sort_by(|a, b| {
            b.level_number
                .cmp(&a.level_number)
                .then(a.row.cmp(&b.row))
                .then(a.column.cmp(&b.column))
        });
        tiles.dedup_by(|a, b| {
            a.level_number == b.level_number && a.row == b.row && a.column == b.column
        });

        Elevations {
            tiles,
            achieved,
            missing_data_sentinel,
            extremes: OnceLock::new(),
        }
    }

    pub fn tiles(&self) -> &[Arc<ElevationTile>] {
        &self.tiles
    }

    /// The elevation at a location, from the finest covering tile. `None`
    /// when no tile in this result set covers the location.
    pub fn elevation(&self, latitude: f64, longitude: f64) -> Option<f64> {
        self.tiles
            .iter()
            .find_map(|tile| tile.sample(latitude, longitude, self.missing_data_sentinel))
    }

    /// Extreme elevations over all tiles in this result, computed lazily.
    /// `None` when every tile is all-sentinel or unpopulated.
    pub fn extremes(&self) -> Option<(f64, f64)> {
        *self.extremes.get_or_init(|| {
            let mut folded: Option<(f64, f64)> = None;
            for tile in &self.tiles {
                let Some((min, max)) = tile.extremes() else {
                    continue;
                };
                if min == self.missing_data_sentinel {
                    continue;
                }
                folded = Some(match folded {
                    None => (min, max),
                    Some((fmin, fmax)) => (fmin.min(min), fmax.max(max)),
                });
            }
            folded
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SENTINEL: f64 = -32768.0;

    fn tile_with(values: Vec<f64>, width: usize, height: usize) -> ElevationTile {
        ElevationTile::new(
            Sector::new(0.0, 10.0, 0.0, 10.0),
            0,
            0,
            0,
            width,
            height,
            10.0 / (height - 1) as f64,
        )
        .with_samples(TileSamples::new(values, SENTINEL))
    }

    #[test]
    fn bilinear_interpolation_midpoint() {
        // 2x2 tile: SW=0, SE=10, NW=20, NE=30.
        let tile = tile_with(vec![0.0, 10.0, 20.0, 30.0], 2, 2);

        assert_eq!(tile.sample(0.0, 0.0, SENTINEL), Some(0.0));
        assert_eq!(tile.sample(0.0, 10.0, SENTINEL), Some(10.0));
        assert_eq!(tile.sample(10.0, 0.0, SENTINEL), Some(20.0));
        assert_eq!(tile.sample(5.0, 5.0, SENTINEL), Some(15.0));
    }

    #[test]
    fn sample_outside_sector_is_none() {
        let tile = tile_with(vec![0.0, 10.0, 20.0, 30.0], 2, 2);
        assert_eq!(tile.sample(11.0, 5.0, SENTINEL), None);
        assert_eq!(tile.sample(5.0, -1.0, SENTINEL), None);
    }

    #[test]
    fn missing_neighbor_propagates_sentinel() {
        // NE corner is a data void; anything interpolating near it must
        // report the sentinel, never a blend.
        let tile = tile_with(vec![0.0, 10.0, 20.0, SENTINEL], 2, 2);
        assert_eq!(tile.sample(5.0, 5.0, SENTINEL), Some(SENTINEL));
        assert_eq!(tile.sample(9.9, 9.9, SENTINEL), Some(SENTINEL));
    }

    #[test]
    fn empty_tile_samples_none() {
        let tile = ElevationTile::new(Sector::new(0.0, 10.0, 0.0, 10.0), 0, 0, 0, 2, 2, 10.0);
        assert!(!tile.has_samples());
        assert_eq!(tile.sample(5.0, 5.0, SENTINEL), None);
    }

    #[test]
    fn samples_extremes_skip_sentinel() {
        let samples = TileSamples::new(vec![5.0, SENTINEL, -3.0, 12.0], SENTINEL);
        assert_eq!(samples.min, -3.0);
        assert_eq!(samples.max, 12.0);

        let voids = TileSamples::new(vec![SENTINEL; 4], SENTINEL);
        assert_eq!(voids.min, SENTINEL);
        assert_eq!(voids.max, SENTINEL);
    }

    #[test]
    fn elevations_prefer_finest_tile() {
        let coarse = Arc::new(
            ElevationTile::new(Sector::new(0.0, 10.0, 0.0, 10.0), 0, 0, 0, 2, 2, 10.0)
                .with_samples(TileSamples::new(vec![1.0; 4], SENTINEL)),
        );
        let fine = Arc::new(
            ElevationTile::new(Sector::new(0.0, 5.0, 0.0, 5.0), 1, 0, 0, 2, 2, 5.0)
                .with_samples(TileSamples::new(vec![2.0; 4], SENTINEL)),
        );

        let elevations = Elevations::new(
            vec![coarse, fine],
            Resolution::Degrees(10.0),
            SENTINEL,
        );

        // Inside the fine tile: fine data wins. Outside it: coarse serves.
        assert_eq!(elevations.elevation(2.0, 2.0), Some(2.0));
        assert_eq!(elevations.elevation(8.0, 8.0), Some(1.0));
        assert_eq!(elevations.elevation(50.0, 50.0), None);
        assert_eq!(elevations.extremes(), Some((1.0, 2.0)));
    }

    #[test]
    fn resolution_folding() {
        let fine = Resolution::Degrees(0.1);
        let coarse = Resolution::Degrees(1.0);
        assert_eq!(fine.coarsest(coarse), Resolution::Degrees(1.0));
        assert_eq!(Resolution::NoData.coarsest(fine), fine);
        assert!(Resolution::NoData
            .coarsest(Resolution::NoData)
            .is_no_data());
    }
}
