//! Elevation data sources.

use async_trait::async_trait;

use crate::coords::{Sector, TileKey};
use crate::error::SourceError;

/// The wire format of a retrieved tile payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TileFormat {
    /// Fixed-width integer or float samples in the model's declared data
    /// type and byte order, row-major south-to-north.
    RawBinary,
    /// A georeferenced gridded raster whose embedded metadata supplies the
    /// sector and sample layout.
    GeoTiff,
}

/// Raw bytes of one tile as retrieved from a source.
#[derive(Clone, Debug)]
pub struct RawTile {
    pub bytes: Vec<u8>,
    pub format: TileFormat,
}

/// Supplies raw elevation tile payloads, over the network or from disk.
///
/// Implementations must be cheap to share across loader tasks. Failures are
/// reported per tile; the engine marks the tile absent with a backoff and
/// the query path degrades to coarser data.
#[async_trait]
pub trait ElevationSource: Send + Sync + 'static {
    async fn retrieve(&self, key: &TileKey, sector: &Sector) -> Result<RawTile, SourceError>;
}
