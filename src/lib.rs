#![doc = r#"
geefetch: download satellite imagery from Google Earth Engine as local tiles.

This crate splits an area of interest into fixed-size tiles, builds a per-dataset Earth
Engine recipe for each tile (cloud masking, speckle filtering, terrain normalization,
compositing, radiometric scaling), and writes the results as georeferenced GeoTIFF chips
with one VRT mosaic per CRS, or as GeoJSON/CSV points for GEDI footprints. It powers the
`geefetch` CLI and can be embedded in your own Rust applications.

Sources: Sentinel-1, Sentinel-2, Landsat-8, GEDI (raster and vector), Dynamic World,
PALSAR-2, NASADEM and custom image collections.

Runs are resumable: chips are written under a temporary name and renamed when complete,
valid chips are skipped on the next run, and each satellite directory keeps a
`config.yaml` snapshot that must match the config of later runs.

Requirements
------------
- GDAL development headers and runtime available on your system.
- An Earth Engine enabled Cloud project, and either `GEEFETCH_ACCESS_TOKEN` set to an
  OAuth access token or an authenticated `gcloud` CLI.
- Rust 2024 edition toolchain.

Configuration
-------------
```yaml
data_dir: ~/geefetch-data
satellite_default:
  aoi:
    spatial: {left: 2.2, right: 2.5, bottom: 48.8, top: 48.9}   # EPSG:4326, UTM tiling
    temporal: {start_date: 2023-06-01, end_date: 2023-09-01}
    country: France
  gee: {ee_project_id: my-ee-project, max_tile_size: 10}
  tile_size: 2000        # pixels
  resolution: 10         # metres
  dtype: Float32
  composite_method: MEDIAN
s2: {cloudless_portion: 40}
gedi: {format: geojson}
```

Quick start: download Sentinel-2 tiles
--------------------------------------
```rust,no_run
use std::path::Path;
use geefetch::{api, GeefetchConfig};

fn main() -> geefetch::Result<()> {
    let config = GeefetchConfig::load(Path::new("config.yaml"))?;
    let report = api::download_s2(&config)?;
    println!(
        "downloaded={} skipped={} failed={}",
        report.downloaded, report.skipped, report.failed
    );
    Ok(())
}
```

Lower level: one satellite, your own client
-------------------------------------------
```rust,no_run
use std::path::Path;
use geefetch::{download, DownloadParams, GeefetchConfig, RestClient, TokenProvider, S1};

fn main() -> geefetch::Result<()> {
    let config = GeefetchConfig::load(Path::new("config.yaml"))?;
    let Some(s1) = config.s1.as_ref() else {
        return Ok(());
    };
    let params = DownloadParams::from_config(
        &s1.base,
        &config.data_dir,
        vec!["VV".into(), "VH".into()],
        Vec::new(),
    )?;
    let client = RestClient::new(vec!["my-ee-project".into()], TokenProvider::from_env())?;
    download(&client, &S1::default(), &params)?;
    Ok(())
}
```

Error handling
--------------
All public functions return `geefetch::Result<T>`; match on `geefetch::Error` to handle
specific cases.

```rust,no_run
use std::path::Path;
use geefetch::{api, Error, GeefetchConfig};

fn main() {
    let Ok(config) = GeefetchConfig::load(Path::new("config.yaml")) else {
        return;
    };
    match api::download_landsat8(&config) {
        Ok(_) => {}
        Err(Error::NotConfigured { satellite }) => eprintln!("add a `{satellite}` block"),
        Err(Error::ConfigMismatch) => eprintln!("data_dir holds a run with another config"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: one entry point per source, running the full flow.
- [`satellites`]: per-dataset Earth Engine recipes behind the `Satellite` trait.
- [`download`]: parallel tile download, chip retries and request splitting.
- [`ee`]: Earth Engine expression builders and REST client.
- [`core`]: config, coordinates, tiling, country filter and post-processing.
- [`io`]: GDAL readers and GeoTIFF/VRT/vector writers.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod download;
pub mod ee;
pub mod error;
pub mod io;
pub mod satellites;
pub mod types;

// Curated public API surface
// Types
pub use core::config::GeefetchConfig;
pub use core::coords::{Crs, GeoBoundingBox};
pub use core::params::DownloadParams;
pub use error::{Error, Result};
pub use types::{CompositeMethod, DType, Format, P2Orbit, S1Orbit};

// Earth Engine
pub use ee::{EarthEngineApi, EeError, RestClient, TokenProvider};

// Sources
pub use satellites::{
    CustomSatellite, DynWorld, GediRaster, GediVector, Landsat8, Nasadem, Palsar2, S1, S2,
    Satellite,
};

// Readers
pub use io::gdal::{GdalError, GdalMetadata, GeoTiffReader};

// Download entry points
pub use download::{DownloadReport, download};
