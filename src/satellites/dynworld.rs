//! Dynamic World land cover class probabilities.
use super::{
    Downloadable, Satellite, TileQuery, composite, convert_image, resolve_bands, split_collection,
};
use crate::ee::{EarthEngineApi, Geometry, Image, ImageCollection};
use crate::error::Result;

pub const COLLECTION: &str = "GOOGLE/DYNAMICWORLD/V1";
const BANDS: &[&str] = &[
    "water",
    "trees",
    "grass",
    "flooded_vegetation",
    "crops",
    "shrub_and_scrub",
    "built",
    "bare",
    "snow_and_ice",
    "label",
];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DynWorld;

impl DynWorld {
    fn collection(&self, query: &TileQuery, bounds: &Geometry, bands: &[String]) -> Result<ImageCollection> {
        let (start, end) = query.dates(self.name())?;
        Ok(ImageCollection::load(COLLECTION)
            .filter_bounds(bounds)
            .filter_date(&start, &end)
            .select(bands))
    }
}

impl Satellite for DynWorld {
    fn name(&self) -> &str {
        "dyn_world"
    }

    fn full_name(&self) -> &str {
        "Dynamic World"
    }

    fn bands(&self) -> Vec<String> {
        BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn default_selected_bands(&self) -> Vec<String> {
        BANDS
            .iter()
            .filter(|b| **b != "label")
            .map(|b| b.to_string())
            .collect()
    }

    fn pixel_range(&self, _band: &str) -> (f64, f64) {
        (0.0, 1.0)
    }

    fn resolution(&self) -> f64 {
        10.0
    }

    fn get(&self, _api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable> {
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        let col = self.collection(query, &query.search_region()?, &bands)?;
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
        let col = self.collection(query, &region, &bands)?;
        split_collection(api, &col)?
            .into_iter()
            .map(|(id, im)| Ok((id, convert_image(self, &im.clip(&region), &bands, query.dtype)?)))
            .collect()
    }
}
