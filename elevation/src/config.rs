//! Immutable model configuration.
//!
//! Every recognized option is an explicit field, validated once at model
//! construction. There is no mutable property bag; a model's configuration
//! never changes after construction.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::coords::{LatLon, Sector};
use crate::error::ConfigError;

/// The fixed-width numeric type of raw-binary tile samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one sample in bytes.
    pub fn size(&self) -> usize {
        match self {
            DataType::Int8 => 1,
            DataType::Int16 => 2,
            DataType::Int32 => 4,
            DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }
}

/// Byte order of raw-binary tile samples.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Endianness {
    Big,
    Little,
}

/// Configuration of an elevation model, consumed at construction.
#[derive(Clone, Debug)]
pub struct ElevationModelConfig {
    /// Cache namespace; part of every tile key produced by this model.
    pub cache_name: String,
    /// The sector this model has data for.
    pub coverage: Sector,
    /// Reference point for row/column arithmetic. Must sit at or
    /// south-west of the coverage sector's minimum corner.
    pub origin: LatLon,
    /// Number of quad-tree refinement levels.
    pub num_levels: u32,
    /// Angular (latitude, longitude) extent of one tile at level zero.
    pub level_zero_tile_delta: (f64, f64),
    /// Samples per tile in the longitude direction.
    pub tile_width: usize,
    /// Samples per tile in the latitude direction.
    pub tile_height: usize,
    /// Sample type of raw-binary tiles.
    pub data_type: DataType,
    /// Byte order of raw-binary tiles.
    pub byte_order: Endianness,
    /// Reserved sample value meaning "no data here".
    pub missing_data_sentinel: f64,
    /// Value substituted for the sentinel in mapped query results.
    pub missing_data_replacement: f64,
    /// Declared lower bound of all elevations in this model.
    pub min_elevation: f64,
    /// Declared upper bound of all elevations in this model.
    pub max_elevation: f64,
    /// Tiles last updated before this instant are refreshed in the
    /// background when used.
    pub expiry: Option<SystemTime>,
    /// Whether background retrieval may be scheduled at all.
    pub network_enabled: bool,
    /// Optional precomputed extremes file.
    pub extremes_path: Option<PathBuf>,
    /// Levels intentionally without any data (e.g. ocean-only levels).
    /// Fallback searches terminate at these instead of requesting tiles.
    pub empty_levels: Vec<u32>,
    /// Failed retrievals tolerated before a tile is suppressed as absent.
    pub absent_max_tries: u32,
    /// Backoff before an absent tile may be retried.
    pub absent_retry_interval: Duration,
}

impl ElevationModelConfig {
    /// A global model with SRTM-like geometry and bounds, handy as a
    /// starting point for demos and tests.
    pub fn global(cache_name: impl Into<String>) -> Self {
        ElevationModelConfig {
            cache_name: cache_name.into(),
            coverage: Sector::full_sphere(),
            origin: LatLon::new(-90.0, -180.0),
            num_levels: 5,
            level_zero_tile_delta: (20.0, 20.0),
            tile_width: 150,
            tile_height: 150,
            data_type: DataType::Int16,
            byte_order: Endianness::Big,
            missing_data_sentinel: -32768.0,
            missing_data_replacement: 0.0,
            min_elevation: -11000.0,
            max_elevation: 8850.0,
            expiry: None,
            network_enabled: true,
            extremes_path: None,
            empty_levels: Vec::new(),
            absent_max_tries: 3,
            absent_retry_interval: Duration::from_secs(60),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_name.is_empty() {
            return Err(ConfigError::EmptyCacheName);
        }
        if self.num_levels == 0 {
            return Err(ConfigError::NoLevels(self.num_levels));
        }
        if self.tile_width < 2 || self.tile_height < 2 {
            return Err(ConfigError::TileDimensions {
                width: self.tile_width,
                height: self.tile_height,
            });
        }
        let (dlat, dlon) = self.level_zero_tile_delta;
        if !(dlat > 0.0 && dlon > 0.0) {
            return Err(ConfigError::TileDelta(dlat, dlon));
        }
        if !(self.min_elevation < self.max_elevation) {
            return Err(ConfigError::ElevationBounds {
                min: self.min_elevation,
                max: self.max_elevation,
            });
        }
        // Row/column offsets are counted north- and eastward from the
        // origin; an origin past the coverage corner would make offsets
        // negative for valid coverage points.
        if self.origin.latitude > self.coverage.min_latitude
            || self.origin.longitude > self.coverage.min_longitude
        {
            return Err(ConfigError::OriginNotSouthWest {
                origin: self.origin,
                corner: LatLon::new(self.coverage.min_latitude, self.coverage.min_longitude),
            });
        }
        Ok(())
    }
}
