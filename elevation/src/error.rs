//! Errors which can happen in various parts of the library.

use std::time::Duration;

use thiserror::Error;

/// Construction-time misconfiguration. Not recoverable at runtime.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cache name must not be empty")]
    EmptyCacheName,
    #[error("a level set needs at least one level, got {0}")]
    NoLevels(u32),
    #[error("tile dimensions must be at least 2x2 samples, got {width}x{height}")]
    TileDimensions { width: usize, height: usize },
    #[error("level zero tile delta must be positive, got ({0}, {1})")]
    TileDelta(f64, f64),
    #[error("declared minimum elevation {min} is not below maximum {max}")]
    ElevationBounds { min: f64, max: f64 },
    #[error("tile origin {origin} must not be north or east of the coverage corner {corner}")]
    OriginNotSouthWest {
        origin: crate::coords::LatLon,
        corner: crate::coords::LatLon,
    },
}

/// Failure to obtain raw tile bytes from a source.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("network retrieval is disabled")]
    Offline,
    #[error("tile is not available from this source")]
    NotFound,
    #[error("i/o error while retrieving tile")]
    Io(#[from] std::io::Error),
    #[error("failed to retrieve tile")]
    Fetch(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Failure to decode raw tile bytes into elevation samples.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("tile payload truncated: expected {expected} samples, decoded {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("unsupported sample format in raster")]
    UnsupportedSampleFormat,
    #[error("raster is missing georeferencing tags")]
    MissingGeoTags,
    #[error("malformed raster container")]
    Raster(#[from] tiff::TiffError),
    #[error("i/o error while decoding")]
    Io(#[from] std::io::Error),
}

/// Failure to load or parse a precomputed extremes file.
#[derive(Error, Debug)]
pub enum ExtremesError {
    #[error("extremes filename does not encode a level number: {0}")]
    NoLevelInFilename(String),
    #[error("extremes level {level} is not part of the level set")]
    UnknownLevel { level: u32 },
    #[error("extremes file holds {actual} pairs, level geometry needs {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("i/o error while reading extremes file")]
    Io(#[from] std::io::Error),
}

/// A blocking bulk operation ran out of time before all required tiles
/// became resident.
#[derive(Error, Debug)]
#[error("elevation data not resident after {0:?}")]
pub struct TimeoutError(pub Duration);
