use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::core::config::SatelliteConfig;
use crate::core::coords::{Crs, GeoBoundingBox, Polygon};
use crate::error::Result;
use crate::satellites::TileQuery;
use crate::types::{CompositeMethod, DType, Format};

/// Download parameters resolved from a satellite config block
#[derive(Debug, Clone)]
pub struct DownloadParams {
    pub data_dir: PathBuf,
    pub bounds: GeoBoundingBox,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub composite_method: CompositeMethod,
    pub dtype: DType,
    /// Pixel size, in metres
    pub resolution: f64,
    /// Tile side, in pixels
    pub tile_size: f64,
    /// Size bound of one Earth Engine request, in bytes
    pub max_request_bytes: usize,
    pub selected_bands: Vec<String>,
    /// Tiling CRS; None means one UTM grid per zone
    pub crs: Option<Crs>,
    /// WGS84 footprints restricting the tiles (country mainlands)
    pub filter_polygons: Vec<Polygon>,
    /// Vector output format, for vector sources only
    pub format: Option<Format>,
}

impl DownloadParams {
    pub fn from_config(
        config: &SatelliteConfig,
        data_dir: &Path,
        selected_bands: Vec<String>,
        filter_polygons: Vec<Polygon>,
    ) -> Result<Self> {
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            bounds: config.aoi.spatial.as_bbox()?,
            start_date: config.aoi.start_date(),
            end_date: config.aoi.end_date(),
            composite_method: config.composite_method,
            dtype: config.dtype,
            resolution: config.resolution,
            tile_size: config.tile_size,
            max_request_bytes: (config.gee.max_tile_size as usize) * 1024 * 1024,
            selected_bands,
            crs: config.aoi.spatial.tiling_crs(),
            filter_polygons,
            format: None,
        })
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Tile side in CRS units.
    pub fn tile_side(&self) -> f64 {
        self.tile_size * self.resolution
    }

    pub fn query(&self, tile: &GeoBoundingBox) -> TileQuery {
        TileQuery {
            aoi: *tile,
            start_date: self.start_date,
            end_date: self.end_date,
            composite_method: self.composite_method,
            dtype: self.dtype,
            selected_bands: self.selected_bands.clone(),
        }
    }
}
