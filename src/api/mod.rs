//! High-level library API: one entrypoint per source, each running the whole flow
//! from a loaded [`GeefetchConfig`]: band resolution, config snapshot, country
//! filter, tiling CRS, Earth Engine client and parallel download. Prefer these
//! entrypoints over the `download` module when integrating geefetch.
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use crate::core::config::{
    CustomConfig, GediConfig, GeefetchConfig, OneOrMany, Palsar2Config, S1Config, S2Config,
    SatelliteConfig, configured, save_config,
};
use crate::core::country::load_country_filter;
use crate::core::params::DownloadParams;
use crate::download::download;
use crate::ee::{EarthEngineApi, RestClient, TokenProvider};
use crate::error::Result;
use crate::satellites::{
    CustomSatellite, DynWorld, GediRaster, GediVector, Landsat8, Nasadem, Palsar2, S1, S2,
    Satellite, resolve_bands,
};
use crate::types::Format;

pub use crate::download::DownloadReport;

/// Earth Engine client over the configured project ids.
pub fn connect(config: &SatelliteConfig) -> Result<RestClient> {
    Ok(RestClient::new(
        config.gee.ee_project_id.to_vec(),
        TokenProvider::from_env(),
    )?)
}

/// `config` with its band selection filled in, as saved in the snapshot.
fn with_bands(satellite: &dyn Satellite, config: &SatelliteConfig) -> Result<SatelliteConfig> {
    let bands = resolve_bands(satellite, config.selected_bands.as_deref())?;
    Ok(SatelliteConfig {
        selected_bands: Some(bands),
        ..config.clone()
    })
}

/// Snapshot, country filter, client, download.
fn run<T, A, F>(
    satellite: &dyn Satellite,
    snapshot: &T,
    config: &SatelliteConfig,
    data_dir: &Path,
    format: Option<Format>,
    connect: F,
) -> Result<DownloadReport>
where
    T: Serialize,
    A: EarthEngineApi,
    F: FnOnce(&SatelliteConfig) -> Result<A>,
{
    info!("Downloading {} to {:?}", satellite.full_name(), data_dir);
    save_config(snapshot, &data_dir.join(satellite.name()))?;
    let countries = config
        .aoi
        .country
        .as_ref()
        .map(OneOrMany::to_vec)
        .unwrap_or_default();
    let filter = load_country_filter(&countries)?;
    let mut params = DownloadParams::from_config(
        config,
        data_dir,
        config.selected_bands.clone().unwrap_or_default(),
        filter,
    )?;
    if let Some(format) = format {
        params = params.with_format(format);
    }
    let api = connect(config)?;
    let report = download(&api, satellite, &params)?;
    if report.failed > 0 {
        warn!(
            "{} {} tiles failed; run the same command again to retry them",
            report.failed,
            satellite.full_name()
        );
    }
    Ok(report)
}

fn s1_job(config: &GeefetchConfig) -> Result<(S1, S1Config)> {
    let block = configured(&config.s1, "s1")?;
    let satellite = S1 {
        orbit: block.orbit,
        speckle_filter: block.speckle_filter,
        terrain_normalization: block.terrain_normalization,
    };
    let base = with_bands(&satellite, &block.base)?;
    Ok((satellite, S1Config { base, ..block.clone() }))
}

fn s2_job(config: &GeefetchConfig) -> Result<(S2, S2Config)> {
    let block = configured(&config.s2, "s2")?;
    let satellite = S2 {
        cloudless_portion: block.cloudless_portion,
        cloud_prb_threshold: block.cloud_prb_threshold,
    };
    let base = with_bands(&satellite, &block.base)?;
    Ok((satellite, S2Config { base, ..block.clone() }))
}

fn palsar2_job(config: &GeefetchConfig) -> Result<(Palsar2, Palsar2Config)> {
    let block = configured(&config.palsar2, "palsar2")?;
    let satellite = Palsar2 { orbit: block.orbit };
    let base = with_bands(&satellite, &block.base)?;
    Ok((satellite, Palsar2Config { base, ..block.clone() }))
}

fn gedi_job(config: &GeefetchConfig, satellite: &dyn Satellite) -> Result<GediConfig> {
    let block = configured(&config.gedi, "gedi")?;
    let base = with_bands(satellite, &block.base)?;
    Ok(GediConfig { base, ..block.clone() })
}

fn custom_job(config: &GeefetchConfig, name: &str) -> Result<(CustomSatellite, CustomConfig)> {
    let block = config.custom(name)?;
    let satellite = CustomSatellite::new(&block.url, block.pixel_range, Some(name));
    let base = with_bands(&satellite, &block.base)?;
    Ok((satellite, CustomConfig { base, ..block.clone() }))
}

fn plain_job(
    satellite: &dyn Satellite,
    block: &Option<SatelliteConfig>,
    key: &str,
) -> Result<SatelliteConfig> {
    with_bands(satellite, configured(block, key)?)
}

pub fn download_s1(config: &GeefetchConfig) -> Result<DownloadReport> {
    let (satellite, block) = s1_job(config)?;
    run(&satellite, &block, &block.base, &config.data_dir, None, connect)
}

pub fn download_s2(config: &GeefetchConfig) -> Result<DownloadReport> {
    let (satellite, block) = s2_job(config)?;
    run(&satellite, &block, &block.base, &config.data_dir, None, connect)
}

pub fn download_landsat8(config: &GeefetchConfig) -> Result<DownloadReport> {
    let block = plain_job(&Landsat8, &config.landsat8, "landsat8")?;
    run(&Landsat8, &block, &block, &config.data_dir, None, connect)
}

pub fn download_nasadem(config: &GeefetchConfig) -> Result<DownloadReport> {
    let block = plain_job(&Nasadem, &config.nasadem, "nasadem")?;
    run(&Nasadem, &block, &block, &config.data_dir, None, connect)
}

pub fn download_dynworld(config: &GeefetchConfig) -> Result<DownloadReport> {
    let block = plain_job(&DynWorld, &config.dynworld, "dynworld")?;
    run(&DynWorld, &block, &block, &config.data_dir, None, connect)
}

pub fn download_palsar2(config: &GeefetchConfig) -> Result<DownloadReport> {
    let (satellite, block) = palsar2_job(config)?;
    run(&satellite, &block, &block.base, &config.data_dir, None, connect)
}

/// GEDI L2A canopy heights as a monthly raster.
pub fn download_gedi_raster(config: &GeefetchConfig) -> Result<DownloadReport> {
    let block = gedi_job(config, &GediRaster)?;
    run(&GediRaster, &block, &block.base, &config.data_dir, None, connect)
}

/// GEDI L2A footprints as points, in `gedi.format`.
pub fn download_gedi_vector(config: &GeefetchConfig) -> Result<DownloadReport> {
    let block = gedi_job(config, &GediVector)?;
    let format = Some(block.format);
    run(&GediVector, &block, &block.base, &config.data_dir, format, connect)
}

/// The custom source configured under `customs.<name>`.
pub fn download_custom(config: &GeefetchConfig, name: &str) -> Result<DownloadReport> {
    let (satellite, block) = custom_job(config, name)?;
    run(&satellite, &block, &block.base, &config.data_dir, None, connect)
}

/// Every configured source among s1, s2, gedi (vector), dynworld, palsar2 and
/// landsat8, in that order.
pub fn download_all(config: &GeefetchConfig) -> Result<Vec<(&'static str, DownloadReport)>> {
    let mut reports = Vec::new();
    if config.s1.is_some() {
        reports.push(("s1", download_s1(config)?));
    }
    if config.s2.is_some() {
        reports.push(("s2", download_s2(config)?));
    }
    if config.gedi.is_some() {
        reports.push(("gedi", download_gedi_vector(config)?));
    }
    if config.dynworld.is_some() {
        reports.push(("dynworld", download_dynworld(config)?));
    }
    if config.palsar2.is_some() {
        reports.push(("palsar2", download_palsar2(config)?));
    }
    if config.landsat8.is_some() {
        reports.push(("landsat8", download_landsat8(config)?));
    }
    if reports.is_empty() {
        warn!("No satellite is configured; nothing to download");
    }
    Ok(reports)
}
