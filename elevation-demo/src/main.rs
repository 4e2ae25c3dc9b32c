//! Samples a synthetic global elevation model and prints the results.
//!
//! The source is procedural, so the demo exercises the full retrieval,
//! decode and fallback pipeline without any network or data files.

use std::f64::consts::PI;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use byteorder::{BigEndian, WriteBytesExt};
use clap::Parser;

use elevation::cache::LruMemoryCache;
use elevation::error::SourceError;
use elevation::io::scheduler::TokioScheduler;
use elevation::io::source::{ElevationSource, RawTile, TileFormat};
use elevation::{ElevationModel, ElevationModelConfig, EngineContext, LatLon, Sector, TileKey};

#[derive(Parser)]
#[command(about = "Query a synthetic tiled elevation model")]
struct Args {
    /// Center latitude of the queried sector, degrees.
    #[arg(long, default_value_t = 46.5)]
    latitude: f64,

    /// Center longitude of the queried sector, degrees.
    #[arg(long, default_value_t = 8.0)]
    longitude: f64,

    /// Half-extent of the queried sector, degrees.
    #[arg(long, default_value_t = 2.0)]
    extent: f64,

    /// Target resolution in degrees per sample.
    #[arg(long, default_value_t = 0.05)]
    resolution: f64,

    /// Sample grid edge length.
    #[arg(long, default_value_t = 8)]
    grid: usize,

    /// Suppress background retrieval; only cached data answers.
    #[arg(long)]
    offline: bool,
}

/// A smooth synthetic terrain: a few crossed sinusoids, in meters.
fn terrain(latitude: f64, longitude: f64) -> f64 {
    let lat = latitude.to_radians();
    let lon = longitude.to_radians();
    2000.0 * (3.0 * lat).sin() * (5.0 * lon).cos() + 500.0 * (11.0 * lon + PI / 3.0).sin()
}

/// Serves raw binary tiles sampled from the synthetic terrain.
struct SyntheticSource {
    tile_width: usize,
    tile_height: usize,
}

#[async_trait]
impl ElevationSource for SyntheticSource {
    async fn retrieve(&self, _key: &TileKey, sector: &Sector) -> Result<RawTile, SourceError> {
        let mut bytes = Vec::with_capacity(self.tile_width * self.tile_height * 2);
        for row in 0..self.tile_height {
            let latitude = sector.min_latitude
                + sector.delta_lat() * row as f64 / (self.tile_height - 1) as f64;
            for column in 0..self.tile_width {
                let longitude = sector.min_longitude
                    + sector.delta_lon() * column as f64 / (self.tile_width - 1) as f64;
                bytes
                    .write_i16::<BigEndian>(terrain(latitude, longitude) as i16)
                    .map_err(SourceError::Io)?;
            }
        }
        Ok(RawTile {
            bytes,
            format: TileFormat::RawBinary,
        })
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let config = ElevationModelConfig::global("synthetic");
    let context = Arc::new(EngineContext::new(
        Arc::new(LruMemoryCache::new(64 << 20)),
        Arc::new(TokioScheduler::new()),
        !args.offline,
    ));
    let source = SyntheticSource {
        tile_width: config.tile_width,
        tile_height: config.tile_height,
    };
    let model = match ElevationModel::new(config, context, source) {
        Ok(model) => model,
        Err(error) => {
            eprintln!("invalid model configuration: {error}");
            std::process::exit(1);
        }
    };

    let sector = Sector::new(
        (args.latitude - args.extent).max(-90.0),
        (args.latitude + args.extent).min(90.0),
        (args.longitude - args.extent).max(-180.0),
        (args.longitude + args.extent).min(180.0),
    );

    let grid = args.grid.max(2);
    let mut locations = Vec::with_capacity(grid * grid);
    for row in 0..grid {
        let latitude = sector.min_latitude + sector.delta_lat() * row as f64 / (grid - 1) as f64;
        for column in 0..grid {
            let longitude =
                sector.min_longitude + sector.delta_lon() * column as f64 / (grid - 1) as f64;
            locations.push(LatLon::new(latitude, longitude));
        }
    }

    // First pass answers immediately from whatever is cached; with a cold
    // cache that is the model's extreme lower bound for every location.
    let mut values = vec![f64::NAN; locations.len()];
    let achieved = model.get_elevations(&sector, &locations, args.resolution, &mut values);
    println!("cold query achieved resolution: {achieved:?}");

    if !args.offline {
        match model
            .get_elevations_within(&sector, args.resolution, Duration::from_secs(10))
            .await
        {
            Ok(_) => {
                let achieved =
                    model.get_elevations(&sector, &locations, args.resolution, &mut values);
                println!("warm query achieved resolution: {achieved:?}");
            }
            Err(error) => eprintln!("tiles did not arrive in time: {error}"),
        }
    }

    let (min, max) = model.get_extreme_elevations(&sector);
    println!("extreme bound over sector: [{min:.0}, {max:.0}] m");

    for row in (0..grid).rev() {
        let line: Vec<String> = (0..grid)
            .map(|column| format!("{:8.1}", values[row * grid + column]))
            .collect();
        println!("{}", line.join(" "));
    }
}
