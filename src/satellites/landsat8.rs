//! Landsat-8 Collection 2 Level-2 surface reflectance.
use super::{
    Downloadable, Satellite, TileQuery, composite, convert_image, resolve_bands, split_collection,
};
use crate::ee::{EarthEngineApi, Geometry, Image, ImageCollection};
use crate::error::Result;

pub const COLLECTION: &str = "LANDSAT/LC08/C02/T1_L2";
const BANDS: &[&str] = &[
    "SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7",
];
const DEFAULT_BANDS: &[&str] = &["SR_B2", "SR_B3", "SR_B4", "SR_B5"];
/// QA_PIXEL fill, dilated cloud, cirrus, cloud and cloud shadow.
const QA_PIXEL_MASK_BITS: f64 = 0b11111 as f64;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Landsat8;

impl Landsat8 {
    fn collection(&self, query: &TileQuery, bounds: &Geometry, bands: &[String]) -> Result<ImageCollection> {
        let (start, end) = query.dates(self.name())?;
        let bands = bands.to_vec();
        Ok(ImageCollection::load(COLLECTION)
            .filter_bounds(bounds)
            .filter_date(&start, &end)
            .map(move |im| {
                let clear = im
                    .band("QA_PIXEL")
                    .bitwise_and(&Image::constant(QA_PIXEL_MASK_BITS))
                    .eq(&Image::constant(0.0));
                let unsaturated = im.band("QA_RADSAT").eq(&Image::constant(0.0));
                im.update_mask(&clear.and(&unsaturated)).select(&bands)
            }))
    }
}

impl Satellite for Landsat8 {
    fn name(&self) -> &str {
        "landsat8"
    }

    fn full_name(&self) -> &str {
        "Landsat 8"
    }

    fn bands(&self) -> Vec<String> {
        BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn default_selected_bands(&self) -> Vec<String> {
        DEFAULT_BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn pixel_range(&self, _band: &str) -> (f64, f64) {
        (0.0, 65455.0)
    }

    fn resolution(&self) -> f64 {
        30.0
    }

    fn max_workers(&self) -> usize {
        1
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
