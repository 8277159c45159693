//! Any Earth Engine image or image collection, addressed by its asset id.
use tracing::{debug, warn};

use super::{
    Downloadable, Satellite, TileQuery, collection_size, composite, convert_image, resolve_bands,
};
use crate::ee::{EarthEngineApi, EeError, Image, ImageCollection};
use crate::error::{Error, Result};

const LARGE_COLLECTION: u64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct CustomSatellite {
    pub name: String,
    pub url: String,
    pub pixel_range: (f64, f64),
    full_name: String,
}

impl CustomSatellite {
    /// `name` defaults to the last path segment of `url`.
    pub fn new(url: &str, pixel_range: Option<(f64, f64)>, name: Option<&str>) -> Self {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| url.rsplit('/').next().unwrap_or(url).to_string());
        Self {
            full_name: format!("CustomSatellite({name})"),
            name,
            url: url.to_string(),
            pixel_range: pixel_range.unwrap_or((0.0, 1.0)),
        }
    }

    fn collection(&self, query: &TileQuery) -> Result<ImageCollection> {
        let mut col = ImageCollection::load(&self.url);
        if let Ok((start, end)) = query.dates(&self.name) {
            col = col.filter_date(&start, &end);
        }
        Ok(col.filter_bounds(&query.search_region()?))
    }
}

impl Satellite for CustomSatellite {
    fn name(&self) -> &str {
        &self.name
    }

    fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Unknown until queried; any band name is accepted.
    fn bands(&self) -> Vec<String> {
        Vec::new()
    }

    fn default_selected_bands(&self) -> Vec<String> {
        Vec::new()
    }

    fn check_selected_bands(&self, bands: &[String]) -> Result<()> {
        if bands.is_empty() {
            return Err(Error::Config(format!(
                "{} requires selected_bands",
                self.full_name
            )));
        }
        Ok(())
    }

    fn pixel_range(&self, _band: &str) -> (f64, f64) {
        self.pixel_range
    }

    fn resolution(&self) -> f64 {
        10.0
    }

    fn get(&self, api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable> {
        let bands = resolve_bands(self, Some(&query.selected_bands))?;
        let region = query.region()?;
        let col = self.collection(query)?;
        let image = match collection_size(api, &col) {
            Ok(n) => {
                if n > LARGE_COLLECTION {
                    warn!(
                        "Mosaicking with a large amount of images (n={}). Expect slower download time.",
                        n
                    );
                }
                debug!("Mosaicking with {} images.", n);
                composite(query.composite_method, &col)?.clip(&region)
            }
            // the asset is a single image, not a collection
            Err(Error::EarthEngine(EeError::Api { message, .. })) => {
                debug!("{} is not a collection ({}), loading it as an image", self.url, message);
                Image::load(&self.url).clip(&region)
            }
            Err(e) => return Err(e),
        };
        Ok(Downloadable::Image(convert_image(self, &image, &bands, query.dtype)?))
    }

    fn get_time_series(
        &self,
        _api: &dyn EarthEngineApi,
        _query: &TileQuery,
    ) -> Result<Vec<(String, Image)>> {
        Err(Error::Unsupported(
            "Time series is not implemented for custom satellite.".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ee::client::tests::MockEarthEngine;
    use crate::satellites::test_support::{function_names, paris_query};
    use crate::types::{CompositeMethod, DType};
    use serde_json::json;

    #[test]
    fn test_name_from_url() {
        let sat = CustomSatellite::new("projects/sat-io/open-datasets/ESA/ESA_CCI_AGB", None, None);
        assert_eq!(sat.name(), "ESA_CCI_AGB");
        assert_eq!(sat.pixel_range("b1"), (0.0, 1.0));
        let sat = CustomSatellite::new("a/b", Some((0.0, 500.0)), Some("agb"));
        assert_eq!(sat.full_name(), "CustomSatellite(agb)");
    }

    #[test]
    fn test_collection_composite() {
        let api = MockEarthEngine::default();
        api.push_value(Ok(json!(2)));
        let sat = CustomSatellite::new("a/collection", None, None);
        let q = paris_query(CompositeMethod::Median, DType::Float32, &["AGB"]);
        let Downloadable::Image(im) = sat.get(&api, &q).unwrap() else {
            panic!("expected an image");
        };
        assert!(function_names(&im).contains(&"reduce.median".to_string()));
    }

    #[test]
    fn test_falls_back_to_image() {
        let api = MockEarthEngine::default();
        api.push_value(Err(EeError::Api {
            status: 400,
            message: "ImageCollection.load: 'a/image' is not an ImageCollection.".into(),
        }));
        let sat = CustomSatellite::new("a/image", None, None);
        let q = paris_query(CompositeMethod::Median, DType::Float32, &["AGB"]);
        let Downloadable::Image(im) = sat.get(&api, &q).unwrap() else {
            panic!("expected an image");
        };
        let names = function_names(&im);
        assert!(names.contains(&"Image.load".to_string()));
        assert!(!names.contains(&"reduce.median".to_string()));
        // clipped to the tile itself, not the buffered search footprint
        let bands = vec!["AGB".to_string()];
        let expected = Image::load("a/image").clip(&q.region().unwrap());
        let expected = convert_image(&sat, &expected, &bands, DType::Float32).unwrap();
        assert_eq!(im, expected);
    }

    #[test]
    fn test_requires_bands() {
        let api = MockEarthEngine::default();
        let sat = CustomSatellite::new("a/b", None, None);
        let q = paris_query(CompositeMethod::Median, DType::Float32, &[]);
        assert!(sat.get(&api, &q).is_err());
    }
}
