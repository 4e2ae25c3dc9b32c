//! Provides utilities related to geographic coordinates and tile addressing.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// A geographic location in degrees.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLon {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        LatLon {
            latitude,
            longitude,
        }
    }
}

impl Default for LatLon {
    fn default() -> Self {
        LatLon {
            latitude: 0.0,
            longitude: 0.0,
        }
    }
}

impl Display for LatLon {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// How two sectors relate to each other.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Overlap {
    /// The first sector fully contains the second.
    Contains,
    /// The sectors overlap but neither contains the other.
    Intersects,
    /// The sectors have no area in common.
    Disjoint,
}

/// A rectangular geographic region in latitude/longitude degrees.
///
/// Bounds are inclusive on all edges. `min_latitude <= max_latitude` and
/// `min_longitude <= max_longitude` always hold.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl Sector {
    pub fn new(min_latitude: f64, max_latitude: f64, min_longitude: f64, max_longitude: f64) -> Self {
        assert!(
            min_latitude.is_finite()
                && max_latitude.is_finite()
                && min_longitude.is_finite()
                && max_longitude.is_finite(),
            "sector bounds must be finite"
        );
        assert!(
            min_latitude <= max_latitude && min_longitude <= max_longitude,
            "sector bounds out of order"
        );
        Sector {
            min_latitude,
            max_latitude,
            min_longitude,
            max_longitude,
        }
    }

    /// The sector covering the whole globe.
    pub fn full_sphere() -> Self {
        Sector::new(-90.0, 90.0, -180.0, 180.0)
    }

    pub fn delta_lat(&self) -> f64 {
        self.max_latitude - self.min_latitude
    }

    pub fn delta_lon(&self) -> f64 {
        self.max_longitude - self.min_longitude
    }

    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.min_latitude
            && latitude <= self.max_latitude
            && longitude >= self.min_longitude
            && longitude <= self.max_longitude
    }

    pub fn contains_sector(&self, other: &Sector) -> bool {
        other.min_latitude >= self.min_latitude
            && other.max_latitude <= self.max_latitude
            && other.min_longitude >= self.min_longitude
            && other.max_longitude <= self.max_longitude
    }

    /// Relationship of `self` to `other`.
    pub fn intersects(&self, other: &Sector) -> Overlap {
        if other.min_latitude > self.max_latitude
            || other.max_latitude < self.min_latitude
            || other.min_longitude > self.max_longitude
            || other.max_longitude < self.min_longitude
        {
            Overlap::Disjoint
        } else if self.contains_sector(other) {
            Overlap::Contains
        } else {
            Overlap::Intersects
        }
    }

    /// The overlapping region of two sectors, if any.
    pub fn intersection(&self, other: &Sector) -> Option<Sector> {
        if self.intersects(other) == Overlap::Disjoint {
            return None;
        }

        Some(Sector {
            min_latitude: self.min_latitude.max(other.min_latitude),
            max_latitude: self.max_latitude.min(other.max_latitude),
            min_longitude: self.min_longitude.max(other.min_longitude),
            max_longitude: self.max_longitude.min(other.max_longitude),
        })
    }
}

impl Display for Sector {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "S(lat=[{},{}],lon=[{},{}])",
            self.min_latitude, self.max_latitude, self.min_longitude, self.max_longitude
        )
    }
}

/// Identifies a tile within a quad tree of geographic sectors.
///
/// Equality and hashing are purely structural. A key is never mutated after
/// creation; it is the lookup key for the tile memory caches.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub level: u32,
    pub row: u32,
    pub column: u32,
    pub cache_name: String,
}

impl TileKey {
    pub fn new(level: u32, row: u32, column: u32, cache_name: impl Into<String>) -> Self {
        TileKey {
            level,
            row,
            column,
            cache_name: cache_name.into(),
        }
    }

    /// The key of the tile one level coarser which contains this one.
    pub fn parent(&self) -> Option<TileKey> {
        if self.level == 0 {
            return None;
        }

        Some(TileKey {
            level: self.level - 1,
            row: self.row >> 1,
            column: self.column >> 1,
            cache_name: self.cache_name.clone(),
        })
    }

    /// The ancestor key at `level`, which must not be finer than this key's
    /// level.
    pub fn ancestor(&self, level: u32) -> TileKey {
        assert!(level <= self.level, "ancestor level finer than tile level");
        let shift = self.level - level;
        TileKey {
            level,
            row: self.row >> shift,
            column: self.column >> shift,
            cache_name: self.cache_name.clone(),
        }
    }
}

impl Display for TileKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TK(level={},row={},col={})",
            self.level, self.row, self.column
        )
    }
}

/// Computes the tile row containing `latitude` for tiles of `tile_delta`
/// degrees, counted northward from `origin_latitude`.
///
/// The latitude at the very top of the grid resolves to the last row rather
/// than one past it.
pub fn compute_row(tile_delta: f64, latitude: f64, origin_latitude: f64) -> u32 {
    assert!(tile_delta > 0.0, "tile delta must be positive");
    assert!(
        latitude.is_finite() && (-90.0..=90.0).contains(&latitude),
        "latitude out of range: {latitude}"
    );

    let offset = latitude - origin_latitude;
    assert!(offset >= 0.0, "latitude below grid origin");

    let mut row = (offset / tile_delta).floor() as i64;
    // Latitude at the northern edge of the grid belongs to the top row.
    if offset == 180.0 {
        row -= 1;
    }
    row as u32
}

/// Computes the tile column containing `longitude` for tiles of `tile_delta`
/// degrees, counted eastward from `origin_longitude`.
///
/// Longitudes west of the origin wrap around the antimeridian, and +180°
/// resolves to the boundary column rather than overflowing the grid.
pub fn compute_column(tile_delta: f64, longitude: f64, origin_longitude: f64) -> u32 {
    assert!(tile_delta > 0.0, "tile delta must be positive");
    assert!(
        longitude.is_finite() && (-180.0..=180.0).contains(&longitude),
        "longitude out of range: {longitude}"
    );

    let mut offset = longitude - origin_longitude;
    if offset < 0.0 {
        offset += 360.0;
    }

    let mut column = (offset / tile_delta).floor() as i64;
    // Longitude at the eastern edge of the grid belongs to the last column.
    if offset == 360.0 {
        column -= 1;
    }
    column as u32
}

/// The latitude of the southern edge of `row`.
pub fn row_latitude(row: u32, tile_delta: f64, origin_latitude: f64) -> f64 {
    origin_latitude + row as f64 * tile_delta
}

/// The longitude of the western edge of `column`.
pub fn column_longitude(column: u32, tile_delta: f64, origin_longitude: f64) -> f64 {
    origin_longitude + column as f64 * tile_delta
}
