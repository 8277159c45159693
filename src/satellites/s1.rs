//! Sentinel-1 GRD backscatter (dB), with optional terrain normalization and
//! boxcar speckle filtering applied to each acquisition before compositing.
use std::f64::consts::PI;

use tracing::{debug, warn};

use super::{
    Downloadable, Satellite, TileQuery, collection_size, composite, convert_image, resolve_bands,
    split_collection,
};
use crate::ee::{EarthEngineApi, Filter, Image, ImageCollection, Value};
use crate::error::{Error, Result};
use crate::types::S1Orbit;

pub const COLLECTION: &str = "COPERNICUS/S1_GRD";
const BANDS: &[&str] = &["HH", "HV", "VV", "VH", "angle"];
const DEFAULT_BANDS: &[&str] = &["VV", "VH"];
const LARGE_COLLECTION: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct S1 {
    pub orbit: S1Orbit,
    /// Boxcar radius in pixels; `None` disables the filter.
    pub speckle_filter: Option<u32>,
    pub terrain_normalization: bool,
}

impl Default for S1 {
    fn default() -> Self {
        Self {
            orbit: S1Orbit::Ascending,
            speckle_filter: None,
            terrain_normalization: false,
        }
    }
}

fn polarizations(bands: &[String]) -> Vec<String> {
    bands.iter().filter(|b| *b != "angle").cloned().collect()
}

/// Only [VV], [HH], [HH, HV] and [VV, VH] exist in the GRD catalog.
fn check_polarization_combination(bands: &[String]) -> Result<()> {
    let mut pols = polarizations(bands);
    pols.sort();
    let ok = matches!(
        pols.iter().map(String::as_str).collect::<Vec<_>>().as_slice(),
        ["VV"] | ["HH"] | ["HH", "HV"] | ["VH", "VV"]
    );
    if ok {
        Ok(())
    } else {
        Err(Error::Config(
            "Only polarization band combination accepted for Sentinel-1 are [VV], [HH], [HH, HV] or [VV, VH]"
                .to_string(),
        ))
    }
}

impl S1 {
    fn collection(
        &self,
        query: &TileQuery,
        bands: &[String],
        orbit: S1Orbit,
        for_time_series: bool,
    ) -> Result<ImageCollection> {
        let (start, end) = query.dates(self.name())?;
        let bounds = if for_time_series {
            query.region()?
        } else {
            query.search_region()?
        };
        let band_filter = Filter::and(
            polarizations(bands)
                .iter()
                .map(|b| Filter::list_contains("transmitterReceiverPolarisation", Value::from(b.as_str())))
                .collect(),
        );
        let mut col = ImageCollection::load(COLLECTION)
            .filter_date(&start, &end)
            .filter_bounds(&bounds)
            .filter(band_filter)
            .filter(Filter::eq("instrumentMode", "IW"));
        match orbit {
            S1Orbit::Ascending | S1Orbit::Descending => {
                col = col.filter(Filter::eq("orbitProperties_pass", orbit.to_string().as_str()));
            }
            S1Orbit::Both => {}
            S1Orbit::AsBands => {
                return Err(Error::Config(format!(
                    "Cannot get S1 collection with orbit={orbit}"
                )));
            }
        }
        Ok(self.preprocess(col, bands))
    }

    /// Per-acquisition corrections, in dB.
    fn preprocess(&self, col: ImageCollection, bands: &[String]) -> ImageCollection {
        if self.speckle_filter.is_none() && !self.terrain_normalization {
            return col;
        }
        let pols = polarizations(bands);
        let speckle = self.speckle_filter;
        let terrain = self.terrain_normalization;
        col.map(move |im| {
            let mut out = im.select(&pols);
            if let Some(radius) = speckle {
                let ten = Image::constant(10.0);
                let linear = ten.pow(&out.divide(&ten));
                out = linear
                    .focal_mean(radius)
                    .log10()
                    .multiply(&ten)
                    .rename(&pols);
            }
            if terrain {
                // sigma0 to gamma0: divide by cos(incidence) in linear power
                let cos_angle = im
                    .band("angle")
                    .multiply(&Image::constant(PI / 180.0))
                    .cos();
                out = out.subtract(&cos_angle.log10().multiply(&Image::constant(10.0)));
            }
            im.add_bands_overwrite(&out)
        })
    }

    fn composite_orbit(
        &self,
        api: &dyn EarthEngineApi,
        query: &TileQuery,
        bands: &[String],
        orbit: S1Orbit,
    ) -> Result<Image> {
        let col = self.collection(query, bands, orbit, false)?;
        let n = collection_size(api, &col)?;
        if n > LARGE_COLLECTION {
            warn!(
                "Sentinel-1 mosaicking with a large amount of images (n={}). Expect slower download time.",
                n
            );
        }
        if n == 0 {
            return Err(Error::EmptyCollection {
                satellite: self.full_name().to_string(),
                region: query.wgs84()?.to_string(),
            });
        }
        debug!("Sentinel-1 mosaicking with {} images.", n);
        let image = composite(query.composite_method, &col)?.clip(&query.region()?);
        convert_image(self, &image, bands, query.dtype)
    }
}

impl Satellite for S1 {
    fn name(&self) -> &str {
        "s1"
    }

    fn full_name(&self) -> &str {
        "Sentinel-1"
    }

    fn bands(&self) -> Vec<String> {
        BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn default_selected_bands(&self) -> Vec<String> {
        DEFAULT_BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn pixel_range(&self, band: &str) -> (f64, f64) {
        match band {
            "angle" => (0.0, 90.0),
            _ => (-30.0, 0.0),
        }
    }

    fn resolution(&self) -> f64 {
        10.0
    }

    fn get(&self, api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable> {
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        check_polarization_combination(&bands)?;
        let image = match self.orbit {
            S1Orbit::Ascending | S1Orbit::Descending | S1Orbit::Both => {
                self.composite_orbit(api, query, &bands, self.orbit)?
            }
            S1Orbit::AsBands => {
                let rename = |suffix: &str| -> Vec<String> {
                    bands.iter().map(|b| format!("{b}_{suffix}")).collect()
                };
                let asc = self
                    .composite_orbit(api, query, &bands, S1Orbit::Ascending)?
                    .select(&bands)
                    .rename(&rename("ascending"));
                let desc = self
                    .composite_orbit(api, query, &bands, S1Orbit::Descending)?
                    .select(&bands)
                    .rename(&rename("descending"));
                asc.add_bands(&desc)
            }
        };
        Ok(Downloadable::Image(image))
    }

    fn get_time_series(
        &self,
        api: &dyn EarthEngineApi,
        query: &TileQuery,
    ) -> Result<Vec<(String, Image)>> {
        if self.orbit == S1Orbit::AsBands {
            return Err(Error::Config(
                "Orbit AS_BANDS is not permitted for downloading time series.".to_string(),
            ));
        }
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        check_polarization_combination(&bands)?;
        let col = self.collection(query, &bands, self.orbit, true)?;
        let images = split_collection(api, &col)?;
        if images.is_empty() {
            return Err(Error::EmptyCollection {
                satellite: self.full_name().to_string(),
                region: query.wgs84()?.to_string(),
            });
        }
        let region = query.region()?;
        images
            .into_iter()
            .map(|(id, im)| Ok((id, convert_image(self, &im.clip(&region), &bands, query.dtype)?)))
            .collect()
    }
}
