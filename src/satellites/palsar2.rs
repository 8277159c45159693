//! ALOS-2 PALSAR-2 ScanSAR level 2.2 backscatter.
use tracing::debug;

use super::{
    Downloadable, Satellite, TileQuery, collection_size, composite, convert_image, resolve_bands,
    split_collection,
};
use crate::ee::{EarthEngineApi, Filter, Geometry, Image, ImageCollection};
use crate::error::{Error, Result};
use crate::types::P2Orbit;

pub const COLLECTION: &str = "JAXA/ALOS/PALSAR-2/Level2_2/ScanSAR";
const BANDS: &[&str] = &["HH", "HV", "LIN", "MSK"];
const DEFAULT_BANDS: &[&str] = &["HH", "HV"];

#[derive(Debug, Clone, PartialEq)]
pub struct Palsar2 {
    pub orbit: P2Orbit,
}

impl Default for Palsar2 {
    fn default() -> Self {
        Self {
            orbit: P2Orbit::Descending,
        }
    }
}

impl Palsar2 {
    fn collection(&self, query: &TileQuery, bounds: &Geometry) -> ImageCollection {
        let mut col = ImageCollection::load(COLLECTION);
        // dates are optional for PALSAR-2
        if let Ok((start, end)) = query.dates(self.name()) {
            col = col.filter_date(&start, &end);
        }
        col.filter_bounds(bounds)
            .filter(Filter::eq("PassDirection", self.orbit.pass_direction()))
    }

    fn empty(&self, query: &TileQuery) -> Error {
        let region = query
            .wgs84()
            .map(|b| b.to_string())
            .unwrap_or_else(|_| query.aoi.to_string());
        Error::EmptyCollection {
            satellite: self.full_name().to_string(),
            region,
        }
    }
}

impl Satellite for Palsar2 {
    fn name(&self) -> &str {
        "palsar2"
    }

    fn full_name(&self) -> &str {
        "Palsar-2"
    }

    fn bands(&self) -> Vec<String> {
        BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn default_selected_bands(&self) -> Vec<String> {
        DEFAULT_BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn pixel_range(&self, _band: &str) -> (f64, f64) {
        (0.0, 8000.0)
    }

    fn resolution(&self) -> f64 {
        25.0
    }

    fn max_workers(&self) -> usize {
        1
    }

    fn get(&self, api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable> {
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        let col = self.collection(query, &query.search_region()?).select(&bands);
        let n = collection_size(api, &col)?;
        if n == 0 {
            return Err(self.empty(query));
        }
        debug!("Palsar-2 mosaicking with {} images.", n);
        let image = composite(query.composite_method, &col)?.clip(&query.region()?);
        Ok(Downloadable::Image(convert_image(self, &image, &bands, query.dtype)?))
    }

    fn get_time_series(
        &self,
        api: &dyn EarthEngineApi,
        query: &TileQuery,
    ) -> Result<Vec<(String, Image)>> {
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        let region = query.region()?;
        let images = split_collection(api, &self.collection(query, &region))?;
        if images.is_empty() {
            return Err(self.empty(query));
        }
        images
            .into_iter()
            .map(|(id, im)| Ok((id, convert_image(self, &im.clip(&region), &bands, query.dtype)?)))
            .collect()
    }
}
