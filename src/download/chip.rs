//! One chip: the file downloaded for one tile.
//!
//! Chips are written to a hidden temporary file in the target directory and renamed
//! into place, so a file under its final name is always complete.
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::core::coords::GeoBoundingBox;
use crate::core::process::{
    gedi_is_clean, tif_is_clean, tif_is_readable, vector_is_clean, vector_is_readable,
};
use crate::ee::{EarthEngineApi, EeError};
use crate::error::{Error, Result};
use crate::satellites::Downloadable;
use crate::types::{DType, Format};

use super::raster::{RasterRequest, download_raster};
use super::vector::download_features;

pub const MAX_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipStatus {
    Downloaded,
    Skipped,
}

/// How to request, check and store chips of one satellite.
#[derive(Debug, Clone)]
pub struct ChipOptions {
    pub bands: Vec<String>,
    pub dtype: DType,
    pub resolution: f64,
    pub max_request_bytes: usize,
    /// Vector format; None for rasters
    pub format: Option<Format>,
    /// Whether an empty chip is an error
    pub check_clean: bool,
    /// Pause before retry n, multiplied by n
    pub retry_delay: Duration,
}

impl ChipOptions {
    pub fn is_clean(&self, path: &Path) -> bool {
        match (self.format, self.check_clean) {
            (Some(_), _) => vector_is_clean(path),
            (None, true) => tif_is_clean(path),
            // sparse sources only need some valid pixels
            (None, false) => gedi_is_clean(path),
        }
    }

    pub fn is_readable(&self, path: &Path) -> bool {
        match self.format {
            Some(_) => vector_is_readable(path),
            None => tif_is_readable(path),
        }
    }

    /// An existing chip that can be kept as is: it always has to parse, and has
    /// to hold enough data when `check_clean` is set.
    pub fn is_complete(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        if self.check_clean {
            self.is_clean(path)
        } else {
            self.is_readable(path)
        }
    }

    fn extension(&self) -> &'static str {
        self.format.map_or("tif", |f| f.extension())
    }
}

fn is_retryable(e: &Error) -> bool {
    match e {
        // invalid requests fail the same way every time
        Error::EarthEngine(EeError::Api { status, .. }) => *status >= 500,
        Error::EarthEngine(_) | Error::Io(_) | Error::Gdal(_) => true,
        _ => false,
    }
}

fn fetch_to(
    api: &dyn EarthEngineApi,
    downloadable: &Downloadable,
    tile: &GeoBoundingBox,
    path: &Path,
    dir: &Path,
    options: &ChipOptions,
) -> Result<()> {
    let tmp = tempfile::Builder::new()
        .prefix("._")
        .suffix(&format!(".{}", options.extension()))
        .tempfile_in(dir)?;
    match (downloadable, options.format) {
        (Downloadable::Image(image), None) => {
            let request = RasterRequest {
                image,
                bands: &options.bands,
                dtype: options.dtype,
                resolution: options.resolution,
                max_request_bytes: options.max_request_bytes,
            };
            download_raster(api, &request, tile, tmp.path())?;
        }
        (Downloadable::Features(collection), Some(format)) => {
            let n = download_features(api, collection, tile, format, tmp.path())?;
            debug!("{} features for {:?}", n, path);
        }
        _ => {
            return Err(Error::Unsupported(format!(
                "Cannot store this data as {}",
                options.extension()
            )));
        }
    }
    tmp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

/// Download `downloadable` over `tile` to `path`.
///
/// A complete chip already at `path` is kept. Failed requests are retried up to
/// [`MAX_ATTEMPTS`] times. A new chip failing the clean check is an error when
/// `options.check_clean` is set.
pub fn download_chip(
    api: &dyn EarthEngineApi,
    downloadable: &Downloadable,
    tile: &GeoBoundingBox,
    path: &Path,
    options: &ChipOptions,
) -> Result<ChipStatus> {
    if options.is_complete(path) {
        debug!("Skipping {:?}, already downloaded", path);
        return Ok(ChipStatus::Skipped);
    }
    if path.exists() {
        warn!("Found corrupted file {:?}, downloading it again", path);
    }
    let dir = path
        .parent()
        .ok_or_else(|| Error::Config(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        match fetch_to(api, downloadable, tile, path, dir, options) {
            Ok(()) => break,
            Err(e) if is_retryable(&e) && attempt < MAX_ATTEMPTS => {
                warn!(
                    "Download of {:?} failed (attempt {}/{}): {}",
                    path, attempt, MAX_ATTEMPTS, e
                );
                thread::sleep(options.retry_delay * attempt as u32);
            }
            Err(e) if is_retryable(&e) => {
                return Err(Error::Download {
                    path: path.display().to_string(),
                    attempts: attempt,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    if !options.is_clean(path) {
        if options.check_clean {
            return Err(Error::BadData {
                path: path.display().to_string(),
            });
        }
        warn!("Downloaded chip {:?} holds no data", path);
    }
    Ok(ChipStatus::Downloaded)
}
