//! NASADEM elevation model, with a slope band derived server-side.
use tracing::warn;

use super::{Downloadable, Satellite, TileQuery, convert_image, resolve_bands};
use crate::ee::{EarthEngineApi, Image, ImageCollection};
use crate::error::{Error, Result};
use crate::types::CompositeMethod;

pub const COLLECTION: &str = "NASA/NASADEM_HGT/001";
const BANDS: &[&str] = &["elevation", "num", "slope", "swb"];
const DEFAULT_BANDS: &[&str] = &["elevation", "slope"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Nasadem;

impl Satellite for Nasadem {
    fn name(&self) -> &str {
        "nasadem"
    }

    fn full_name(&self) -> &str {
        "NASADEM"
    }

    fn bands(&self) -> Vec<String> {
        BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn default_selected_bands(&self) -> Vec<String> {
        DEFAULT_BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn pixel_range(&self, band: &str) -> (f64, f64) {
        match band {
            "elevation" => (-512.0, 8768.0),
            "slope" => (0.0, 90.0),
            _ => (0.0, 255.0),
        }
    }

    fn resolution(&self) -> f64 {
        30.0
    }

    /// A static dataset: dates are ignored and the tiles are always mosaicked.
    fn get(&self, _api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable> {
        if query.composite_method != CompositeMethod::Mosaic {
            warn!(
                "Composite method {} is ignored for {}, tiles are mosaicked.",
                query.composite_method,
                self.full_name()
            );
        }
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        let image = ImageCollection::load(COLLECTION)
            .filter_bounds(&query.search_region()?)
            .map(|im| im.add_bands(&im.slope()))
            .mosaic()
            .clip(&query.region()?);
        Ok(Downloadable::Image(convert_image(self, &image, &bands, query.dtype)?))
    }

    fn get_time_series(
        &self,
        _api: &dyn EarthEngineApi,
        _query: &TileQuery,
    ) -> Result<Vec<(String, Image)>> {
        Err(Error::Unsupported(
            "Time series is not relevant for DEM.".to_string(),
        ))
    }
}
