//! A tiled elevation data engine.
//!
//! Elevation data is organized as a quad tree of fixed-size raster tiles
//! over a geographic sector. Queries sample the best tiles currently in
//! memory and immediately return resolution-degraded results while missing
//! tiles are retrieved in the background, so the sampling path never blocks
//! on I/O.
//!
//! The entry point is [`model::ElevationModel`], constructed from an
//! [`config::ElevationModelConfig`], an [`context::EngineContext`] carrying
//! the tile cache and scheduler, and an [`io::source::ElevationSource`]
//! implementation that fetches raw tile bytes.

pub mod cache;
pub mod config;
pub mod context;
pub mod coords;
pub mod error;
pub mod extremes;
pub mod io;
pub mod level;
pub mod model;
pub mod tile;

pub use config::ElevationModelConfig;
pub use context::EngineContext;
pub use coords::{LatLon, Sector, TileKey};
pub use model::ElevationModel;
pub use tile::{Elevations, Resolution};
