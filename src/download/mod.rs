//! Parallel download of every tile of an AOI for one satellite.
//!
//! Tiles are downloaded on a bounded rayon pool. Rasters then get one VRT per CRS;
//! vector tiles are merged into a single file.
use std::fs;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::{error, info, warn};

use crate::core::coords::GeoBoundingBox;
use crate::core::params::DownloadParams;
use crate::core::process;
use crate::core::tiler::{self, TileTracker};
use crate::ee::EarthEngineApi;
use crate::error::{Error, Result};
use crate::satellites::{Downloadable, Satellite};
use crate::types::Format;

pub mod chip;
pub mod raster;
pub mod vector;

pub use chip::{ChipOptions, ChipStatus, download_chip};

/// Default pause before retrying a failed chip.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Outcome counts of one download run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DownloadReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl DownloadReport {
    fn record(&mut self, outcome: &Result<ChipStatus>) {
        match outcome {
            Ok(ChipStatus::Downloaded) => self.downloaded += 1,
            Ok(ChipStatus::Skipped) => self.skipped += 1,
            Err(_) => self.failed += 1,
        }
    }
}

fn progress_bar(len: usize, message: String) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("=>-"));
    }
    bar.set_message(message);
    bar
}

fn chip_options(satellite: &dyn Satellite, params: &DownloadParams) -> ChipOptions {
    ChipOptions {
        bands: params.selected_bands.clone(),
        dtype: params.dtype,
        resolution: params.resolution,
        max_request_bytes: params.max_request_bytes,
        format: if satellite.is_raster() {
            None
        } else {
            Some(params.format.unwrap_or(Format::Geojson))
        },
        check_clean: satellite.check_clean(),
        retry_delay: RETRY_DELAY,
    }
}

/// Every acquisition over `tile`, one file per image id in the tile's directory.
fn download_time_series(
    api: &dyn EarthEngineApi,
    satellite: &dyn Satellite,
    params: &DownloadParams,
    tracker: &TileTracker,
    tile: &GeoBoundingBox,
    options: &ChipOptions,
) -> Result<ChipStatus> {
    let dir = tracker.get_time_series_dir(tile);
    let images = satellite.get_time_series(api, &params.query(tile))?;
    if images.is_empty() {
        warn!("No {} acquisition over {}", satellite.name(), tile);
    }
    let mut status = ChipStatus::Skipped;
    for (id, image) in images {
        let path = dir.join(format!("{id}.tif"));
        let outcome = download_chip(api, &Downloadable::Image(image), tile, &path, options)?;
        if outcome == ChipStatus::Downloaded {
            status = ChipStatus::Downloaded;
        }
    }
    Ok(status)
}

fn download_tile(
    api: &dyn EarthEngineApi,
    satellite: &dyn Satellite,
    params: &DownloadParams,
    tracker: &TileTracker,
    tile: &GeoBoundingBox,
    options: &ChipOptions,
) -> Result<ChipStatus> {
    if params.composite_method.is_time_series() {
        return download_time_series(api, satellite, params, tracker, tile, options);
    }
    let path = tracker.get_path(tile);
    // checked before building the query, which may itself hit the API
    if options.is_complete(&path) {
        return Ok(ChipStatus::Skipped);
    }
    let downloadable = satellite.get(api, &params.query(tile))?;
    download_chip(api, &downloadable, tile, &path, options)
}

fn write_mosaics(tracker: &TileTracker) -> Result<()> {
    for (crs_name, files) in tracker.crs_to_paths()? {
        let vrt = tracker.vrt_path(&crs_name);
        process::create_vrt(&vrt, &files)?;
        info!("Mosaic of {} tiles written to {:?}", files.len(), vrt);
    }
    Ok(())
}

fn merge_vectors(tracker: &TileTracker, format: Format) -> Result<()> {
    if tracker.root.join(format!("merged.{}", format.extension())).exists() {
        warn!("Merged {} already exists in {:?}, leaving it as is", format, tracker.root);
        return Ok(());
    }
    if tracker.tracked_files()?.is_empty() {
        warn!("No {} tile to merge in {:?}", format, tracker.root);
        return Ok(());
    }
    match format {
        Format::Geojson => process::merge_geojson(tracker)?,
        Format::Csv => process::merge_csv(tracker)?,
    };
    Ok(())
}

/// Download every tile of `params.bounds` for `satellite` under
/// `<data_dir>/<satellite name>`.
///
/// Failed tiles are logged and counted; the run goes on with the others.
pub fn download(
    api: &dyn EarthEngineApi,
    satellite: &dyn Satellite,
    params: &DownloadParams,
) -> Result<DownloadReport> {
    satellite.check_selected_bands(&params.selected_bands)?;
    if satellite.is_raster() {
        params.dtype.ensure_supported()?;
    }
    let options = chip_options(satellite, params);
    let tracker = TileTracker::new(satellite.name(), &params.data_dir, None, options.format);
    fs::create_dir_all(&tracker.root)?;

    let tiles = tiler::split(
        &params.bounds,
        params.tile_side(),
        params.crs,
        &params.filter_polygons,
    )?;
    info!(
        "Downloading {} {} tiles to {:?}",
        tiles.len(),
        satellite.full_name(),
        tracker.root
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(satellite.max_workers().max(1))
        .build()
        .map_err(Error::external)?;
    let bar = progress_bar(tiles.len(), satellite.full_name().to_string());
    let outcomes: Vec<Result<ChipStatus>> = pool.install(|| {
        tiles
            .par_iter()
            .map(|tile| {
                let outcome = download_tile(api, satellite, params, &tracker, tile, &options);
                if let Err(e) = &outcome {
                    error!("Tile {} failed: {}", tracker.get_path(tile).display(), e);
                }
                bar.inc(1);
                outcome
            })
            .collect()
    });
    bar.finish_and_clear();

    let mut report = DownloadReport::default();
    for outcome in &outcomes {
        report.record(outcome);
    }
    info!(
        "{}: {} downloaded, {} skipped, {} failed",
        satellite.full_name(),
        report.downloaded,
        report.skipped,
        report.failed
    );

    match options.format {
        None if !params.composite_method.is_time_series() => write_mosaics(&tracker)?,
        None => {}
        Some(format) => merge_vectors(&tracker, format)?,
    }
    Ok(report)
}
