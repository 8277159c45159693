//! Sentinel-2 surface reflectance, cloud masked with QA60 and s2cloudless.
use tracing::{debug, warn};

use super::{
    Downloadable, Satellite, TileQuery, collection_size, composite, convert_image, resolve_bands,
    split_collection,
};
use crate::ee::{EarthEngineApi, Filter, Geometry, Image, ImageCollection};
use crate::error::{Error, Result};
use crate::types::ResamplingMethod;

pub const COLLECTION: &str = "COPERNICUS/S2_SR_HARMONIZED";
pub const CLOUD_PROBABILITY: &str = "COPERNICUS/S2_CLOUD_PROBABILITY";
const BANDS: &[&str] = &[
    "B1", "B2", "B3", "B4", "B5", "B6", "B7", "B8", "B8A", "B9", "B11", "B12", "AOT", "WVP",
    "SCL", "TCI_R", "TCI_G", "TCI_B", "MSK_CLDPRB",
];
const DEFAULT_BANDS: &[&str] = &[
    "B2", "B3", "B4", "B5", "B6", "B7", "B8", "B8A", "B11", "B12",
];
/// QA60 opaque (bit 10) and cirrus (bit 11) flags.
const QA60_CLOUD_BITS: f64 = ((1 << 10) | (1 << 11)) as f64;
const MIN_CLOUDLESS_PORTION: i32 = 15;
const CLOUDLESS_PORTION_STEP: i32 = 10;

#[derive(Debug, Clone, PartialEq)]
pub struct S2 {
    /// Minimum share of the scene (in %) that must be cloud free.
    pub cloudless_portion: i32,
    /// s2cloudless probability (in %) above which a pixel is masked.
    pub cloud_prb_threshold: i32,
}

impl Default for S2 {
    fn default() -> Self {
        Self {
            cloudless_portion: 40,
            cloud_prb_threshold: 40,
        }
    }
}

impl S2 {
    fn collection(
        &self,
        query: &TileQuery,
        bounds: &Geometry,
        bands: &[String],
        cloudless_portion: i32,
    ) -> Result<ImageCollection> {
        let (start, end) = query.dates(self.name())?;
        let cloudy = (100 - cloudless_portion) as f64;
        let primary = ImageCollection::load(COLLECTION)
            .filter_bounds(bounds)
            .filter_date(&start, &end)
            .filter(Filter::lte("CLOUDY_PIXEL_PERCENTAGE", cloudy))
            .filter(Filter::lte("HIGH_PROBA_CLOUDS_PERCENTAGE", cloudy / 2.0));
        let probabilities = ImageCollection::load(CLOUD_PROBABILITY)
            .filter_bounds(bounds)
            .filter_date(&start, &end);
        let threshold = self.cloud_prb_threshold as f64;
        let bands = bands.to_vec();
        Ok(primary
            .join_first_on_index(&probabilities, "s2cloudless")
            .map(move |im| {
                let clear = im
                    .band("QA60")
                    .bitwise_and(&Image::constant(QA60_CLOUD_BITS))
                    .eq(&Image::constant(0.0));
                let low_probability = im
                    .get_image("s2cloudless")
                    .band("probability")
                    .lt(&Image::constant(threshold));
                im.update_mask(&clear.and(&low_probability))
                    .select(&bands)
                    .resample(ResamplingMethod::Bilinear)
            }))
    }
}

impl Satellite for S2 {
    fn name(&self) -> &str {
        "s2"
    }

    fn full_name(&self) -> &str {
        "Sentinel-2"
    }

    fn bands(&self) -> Vec<String> {
        BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn default_selected_bands(&self) -> Vec<String> {
        DEFAULT_BANDS.iter().map(|b| b.to_string()).collect()
    }

    fn pixel_range(&self, _band: &str) -> (f64, f64) {
        (0.0, 3000.0)
    }

    fn resolution(&self) -> f64 {
        10.0
    }

    fn get(&self, api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable> {
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        let bounds = query.search_region()?;
        let mut cloudless_portion = self.cloudless_portion;
        let col = loop {
            let col = self.collection(query, &bounds, &bands, cloudless_portion)?;
            let n = collection_size(api, &col)?;
            if n > 0 {
                debug!(
                    "Sentinel-2 mosaicking with {} images (cloudless portion {}%).",
                    n, cloudless_portion
                );
                break col;
            }
            cloudless_portion -= CLOUDLESS_PORTION_STEP;
            if cloudless_portion < MIN_CLOUDLESS_PORTION {
                return Err(Error::EmptyCollection {
                    satellite: self.full_name().to_string(),
                    region: query.wgs84()?.to_string(),
                });
            }
            warn!(
                "Not enough Sentinel-2 images for {}. Retrying with cloudless_portion={}.",
                query.aoi, cloudless_portion
            );
        };
        let image = composite(query.composite_method, &col)?.clip(&query.region()?);
        Ok(Downloadable::Image(convert_image(
            self,
            &image,
            &bands,
            query.dtype,
        )?))
    }

    fn get_time_series(
        &self,
        api: &dyn EarthEngineApi,
        query: &TileQuery,
    ) -> Result<Vec<(String, Image)>> {
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        let region = query.region()?;
        let col = self.collection(query, &region, &bands, self.cloudless_portion)?;
        split_collection(api, &col)?
            .into_iter()
            .map(|(id, im)| Ok((id, convert_image(self, &im.clip(&region), &bands, query.dtype)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ee::client::tests::MockEarthEngine;
    use crate::ee::Expression;
    use crate::satellites::test_support::{function_names, paris_query};
    use crate::types::{CompositeMethod, DType};
    use serde_json::json;

    #[test]
    fn test_retries_with_lower_cloudless_portion() {
        let api = MockEarthEngine::default();
        api.push_value(Ok(json!(0)));
        api.push_value(Ok(json!(0)));
        api.push_value(Ok(json!(4)));
        let q = paris_query(CompositeMethod::Median, DType::UInt16, &["B2", "B3"]);
        let s2 = S2 {
            cloudless_portion: 60,
            cloud_prb_threshold: 40,
        };
        assert!(s2.get(&api, &q).is_ok());
        let requests = api.value_requests.lock().unwrap();
        assert_eq!(requests.len(), 3);
        // third attempt filters with 100 - 40 = 60% cloudy pixels
        let text = serde_json::to_string(&requests[2]).unwrap();
        assert!(text.contains("60.0") || text.contains(":60}"));
    }

    #[test]
    fn test_gives_up_below_minimum_portion() {
        let api = MockEarthEngine::default();
        for _ in 0..3 {
            api.push_value(Ok(json!(0)));
        }
        let q = paris_query(CompositeMethod::Median, DType::UInt16, &["B2"]);
        let s2 = S2 {
            cloudless_portion: 35,
            cloud_prb_threshold: 40,
        };
        let err = s2.get(&api, &q).unwrap_err();
        assert!(matches!(err, Error::EmptyCollection { .. }));
        // 35 then 25, 15 would be tried, 5 is not
        assert_eq!(api.value_requests.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_cloud_mask_uses_join_and_qa60() {
        let api = MockEarthEngine::default();
        api.push_value(Ok(json!(2)));
        let q = paris_query(CompositeMethod::Median, DType::Float32, &["B4"]);
        let Downloadable::Image(im) = S2::default().get(&api, &q).unwrap() else {
            panic!("expected an image");
        };
        let names = function_names(&im);
        for f in ["Join.apply", "Image.bitwiseAnd", "Image.updateMask", "Image.resample"] {
            assert!(names.contains(&f.to_string()), "{f} missing");
        }
        let text = serde_json::to_string(&Expression::new(&im.0)).unwrap();
        assert!(text.contains(CLOUD_PROBABILITY));
    }

    #[test]
    fn test_invalid_band() {
        let api = MockEarthEngine::default();
        let q = paris_query(CompositeMethod::Median, DType::Float32, &["VV"]);
        assert!(matches!(
            S2::default().get(&api, &q),
            Err(Error::InvalidBand { .. })
        ));
    }
}
