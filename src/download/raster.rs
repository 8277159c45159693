//! Raster chips through `image:computePixels`.
//!
//! A tile is requested as one or more pixel windows, each small enough for a single
//! request. Windows refused as too large are split into quadrants. The pieces are
//! then stitched into one GeoTIFF.
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::core::coords::GeoBoundingBox;
use crate::ee::{EarthEngineApi, Expression, Image, PixelGrid, PixelsRequest};
use crate::error::{Error, Result};
use crate::io::GeoTiffReader;
use crate::io::writers::tiff::{GeoTiffWriter, RasterLayout};
use crate::types::DType;

/// Earth Engine refuses grids wider or taller than this.
pub const MAX_GRID_DIMENSION: usize = 32768;
/// Quadrant splits allowed below a window refused as too large.
pub const MAX_SPLIT_DEPTH: usize = 3;

#[derive(Debug, Clone)]
pub struct RasterRequest<'a> {
    pub image: &'a Image,
    pub bands: &'a [String],
    pub dtype: DType,
    pub resolution: f64,
    pub max_request_bytes: usize,
}

/// Pixel window of a grid: offsets and size, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub col: usize,
    pub row: usize,
    pub width: usize,
    pub height: usize,
}

impl Window {
    pub fn quadrants(&self) -> Vec<Window> {
        let half_w = self.width.div_ceil(2);
        let half_h = self.height.div_ceil(2);
        let cols = [(0, half_w), (half_w, self.width - half_w)];
        let rows = [(0, half_h), (half_h, self.height - half_h)];
        let mut out = Vec::with_capacity(4);
        for (dr, h) in rows {
            for (dc, w) in cols {
                if w > 0 && h > 0 {
                    out.push(Window {
                        col: self.col + dc,
                        row: self.row + dr,
                        width: w,
                        height: h,
                    });
                }
            }
        }
        out
    }
}

/// Pixel grid covering `tile` at `resolution`, anchored at its top-left corner.
pub fn tile_grid(tile: &GeoBoundingBox, resolution: f64) -> PixelGrid {
    let width = ((tile.width() / resolution).round() as usize).max(1);
    let height = ((tile.height() / resolution).round() as usize).max(1);
    PixelGrid {
        width,
        height,
        affine: [resolution, 0.0, tile.left, 0.0, -resolution, tile.top],
        crs: tile.crs,
    }
}

/// Split a `width` x `height` grid into windows of at most `max_bytes` for `n_bands`
/// of `dtype`, none larger than [`MAX_GRID_DIMENSION`].
pub fn plan_windows(
    width: usize,
    height: usize,
    n_bands: usize,
    dtype: DType,
    max_bytes: usize,
) -> Vec<Window> {
    let total = (width * height * n_bands.max(1) * dtype.size_in_bytes()) as f64;
    let by_size = (total / max_bytes.max(1) as f64).sqrt().ceil() as usize;
    let n_cols = by_size.max(width.div_ceil(MAX_GRID_DIMENSION)).max(1);
    let n_rows = by_size.max(height.div_ceil(MAX_GRID_DIMENSION)).max(1);
    let step_w = width.div_ceil(n_cols).max(1);
    let step_h = height.div_ceil(n_rows).max(1);
    let mut windows = Vec::new();
    for row in (0..height).step_by(step_h) {
        for col in (0..width).step_by(step_w) {
            windows.push(Window {
                col,
                row,
                width: step_w.min(width - col),
                height: step_h.min(height - row),
            });
        }
    }
    windows
}

fn window_grid(grid: &PixelGrid, window: &Window) -> PixelGrid {
    let a = grid.affine;
    PixelGrid {
        width: window.width,
        height: window.height,
        affine: [
            a[0],
            a[1],
            a[2] + window.col as f64 * a[0],
            a[3],
            a[4],
            a[5] + window.row as f64 * a[4],
        ],
        crs: grid.crs,
    }
}

struct Fetcher<'a> {
    api: &'a dyn EarthEngineApi,
    expression: Expression,
    bands: &'a [String],
    grid: PixelGrid,
    scratch: &'a Path,
}

impl Fetcher<'_> {
    fn fetch(
        &self,
        window: Window,
        depth: usize,
        pieces: &mut Vec<(Window, NamedTempFile)>,
    ) -> Result<()> {
        let request = PixelsRequest {
            expression: self.expression.clone(),
            band_ids: self.bands.to_vec(),
            grid: window_grid(&self.grid, &window),
        };
        match self.api.compute_pixels(&request) {
            Ok(bytes) => {
                let mut piece = tempfile::Builder::new()
                    .prefix("._")
                    .suffix(".tif")
                    .tempfile_in(self.scratch)?;
                piece.write_all(&bytes)?;
                piece.flush()?;
                pieces.push((window, piece));
                Ok(())
            }
            Err(e) if e.is_too_large() && depth < MAX_SPLIT_DEPTH => {
                debug!(
                    "Window {}x{} at ({}, {}) too large, splitting",
                    window.width, window.height, window.col, window.row
                );
                for quadrant in window.quadrants() {
                    self.fetch(quadrant, depth + 1, pieces)?;
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Download `request.image` over `tile` into the GeoTIFF `out`.
///
/// Masked pixels are filled with the dtype's nodata. Temporary pieces live next to `out`.
pub fn download_raster(
    api: &dyn EarthEngineApi,
    request: &RasterRequest,
    tile: &GeoBoundingBox,
    out: &Path,
) -> Result<()> {
    let scratch = out
        .parent()
        .ok_or_else(|| Error::Config(format!("{} has no parent directory", out.display())))?;
    let grid = tile_grid(tile, request.resolution);
    let fetcher = Fetcher {
        api,
        expression: Expression::new(&request.image.unmask(request.dtype.nodata()).0),
        bands: request.bands,
        grid: grid.clone(),
        scratch,
    };
    let windows = plan_windows(
        grid.width,
        grid.height,
        request.bands.len(),
        request.dtype,
        request.max_request_bytes,
    );
    if windows.len() > 1 {
        debug!(
            "Splitting {}x{} px tile in {} requests",
            grid.width,
            grid.height,
            windows.len()
        );
    }
    let mut pieces = Vec::with_capacity(windows.len());
    for window in windows {
        fetcher.fetch(window, 0, &mut pieces)?;
    }

    let layout = RasterLayout {
        width: grid.width,
        height: grid.height,
        geo_transform: grid.geo_transform(),
        projection: tile.crs.wkt()?,
        band_names: request.bands.to_vec(),
        dtype: request.dtype,
    };
    let mut writer = GeoTiffWriter::create(out, &layout)?;
    for (window, piece) in &pieces {
        let reader = GeoTiffReader::open(piece.path())?;
        if reader.metadata.bands != request.bands.len() {
            return Err(Error::BadData {
                path: format!(
                    "{} (got {} bands, expected {})",
                    out.display(),
                    reader.metadata.bands,
                    request.bands.len()
                ),
            });
        }
        for index in 1..=reader.metadata.bands {
            let data = reader.read_band(index)?;
            if data.dim() != (window.height, window.width) {
                return Err(Error::BadData {
                    path: out.display().to_string(),
                });
            }
            writer.write_window(index, (window.col, window.row), &data)?;
        }
    }
    Ok(())
}
