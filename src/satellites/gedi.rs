//! GEDI L2A canopy height, either as monthly rasters or as the raw footprints.
use tracing::{debug, warn};

use super::{Downloadable, Satellite, TileQuery, convert_image};
use crate::ee::{EarthEngineApi, Expression, FeatureCollection, Filter, Image, ImageCollection, Value};
use crate::error::{Error, Result};

pub const MONTHLY_COLLECTION: &str = "LARSE/GEDI/GEDI02_A_002_MONTHLY";
pub const INDEX_COLLECTION: &str = "LARSE/GEDI/GEDI02_A_002_INDEX";
/// GEDI only samples between these latitudes.
pub const MAX_LATITUDE: f64 = 51.6;
const FULL_POWER_BEAMS: [f64; 4] = [5.0, 6.0, 8.0, 11.0];
const VECTOR_DEFAULT_PROPERTIES: &[&str] = &["rh98", "delta_time", "orbit_number"];
const VECTOR_PROPERTIES: &[&str] = &[
    "beam",
    "degrade_flag",
    "delta_time",
    "digital_elevation_model",
    "elev_highestreturn",
    "elev_lowestmode",
    "elevation_bias_flag",
    "energy_total",
    "lat_lowestmode",
    "lon_lowestmode",
    "orbit_number",
    "quality_flag",
    "selected_algorithm",
    "sensitivity",
    "shot_number",
    "solar_azimuth",
    "solar_elevation",
];

fn warn_out_of_coverage(query: &TileQuery) -> Result<()> {
    let wgs = query.wgs84()?;
    if wgs.top > MAX_LATITUDE {
        warn!(
            "No GEDI data is collected above latitude {}°N. Your AOI up to latitude {:.1}° will not be fully represented.",
            MAX_LATITUDE, wgs.top
        );
    }
    if wgs.bottom < -MAX_LATITUDE {
        warn!(
            "No GEDI data is collected below latitude {}°S. Your AOI down to latitude {:.1}° will not be fully represented.",
            MAX_LATITUDE, wgs.bottom
        );
    }
    Ok(())
}

/// Footprints kept for canopy height: valid rh98, good quality, full power beams.
pub fn quality_filter() -> Filter {
    Filter::and(vec![
        Filter::range_contains("rh98", 0.0, 80.0),
        Filter::eq("quality_flag", 1i64),
        Filter::eq("degrade_flag", 0i64),
        Filter::in_list(
            "beam",
            Value::Array(FULL_POWER_BEAMS.iter().map(|b| Value::from(*b as i64)).collect()),
        ),
        Filter::eq("elevation_bias_flag", 0i64),
        Filter::gte("sensitivity", 0.98),
    ])
}

/// Pixel counterpart of [`quality_filter`] on the monthly rasters.
pub fn quality_mask(image: &Image) -> Image {
    let one = Image::constant(1.0);
    let zero = Image::constant(0.0);
    let mask = image
        .band("rh98")
        .in_range(0.0, 80.0)
        .and(&image.band("quality_flag").eq(&one))
        .and(&image.band("degrade_flag").eq(&zero))
        .and(&image.band("beam").in_list(&FULL_POWER_BEAMS))
        .and(&image.band("elevation_bias_flag").eq(&zero))
        .and(&image.band("sensitivity").gte(&Image::constant(0.98)));
    image.update_mask(&mask)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GediRaster;

impl Satellite for GediRaster {
    fn name(&self) -> &str {
        "gedi_raster"
    }

    fn full_name(&self) -> &str {
        "Gedi (Rasterized)"
    }

    fn bands(&self) -> Vec<String> {
        vec!["rh98".to_string()]
    }

    fn default_selected_bands(&self) -> Vec<String> {
        self.bands()
    }

    fn pixel_range(&self, _band: &str) -> (f64, f64) {
        (0.0, 100.0)
    }

    fn resolution(&self) -> f64 {
        10.0
    }

    /// Sparse by nature: empty tiles are legitimate.
    fn check_clean(&self) -> bool {
        false
    }

    fn get(&self, _api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable> {
        warn_out_of_coverage(query)?;
        let (start, end) = query.dates(self.name())?;
        let image = ImageCollection::load(MONTHLY_COLLECTION)
            .filter_bounds(&query.search_region()?)
            .filter_date(&start, &end)
            .map(|im| quality_mask(&im))
            .select(&["rh98"])
            .mosaic()
            .clip(&query.region()?);
        Ok(Downloadable::Image(convert_image(
            self,
            &image,
            &self.bands(),
            query.dtype,
        )?))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GediVector;

impl Satellite for GediVector {
    fn name(&self) -> &str {
        "gedi_vector"
    }

    fn full_name(&self) -> &str {
        "Gedi (Vectorized)"
    }

    /// Footprint properties.
    fn bands(&self) -> Vec<String> {
        let rh = (0..=100).map(|i| format!("rh{i}"));
        VECTOR_PROPERTIES
            .iter()
            .map(|p| p.to_string())
            .chain(rh)
            .collect()
    }

    fn default_selected_bands(&self) -> Vec<String> {
        VECTOR_DEFAULT_PROPERTIES.iter().map(|p| p.to_string()).collect()
    }

    fn pixel_range(&self, _band: &str) -> (f64, f64) {
        (0.0, 100.0)
    }

    fn resolution(&self) -> f64 {
        25.0
    }

    fn is_raster(&self) -> bool {
        false
    }

    /// Tiles without footprints are kept.
    fn check_clean(&self) -> bool {
        false
    }

    fn get(&self, api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable> {
        warn_out_of_coverage(query)?;
        let properties = super::resolve_bands(self, Some(&query.selected_bands))?;
        let (start, end) = query.dates(self.name())?;
        let region = query.region()?;
        let index = FeatureCollection::load(INDEX_COLLECTION)
            .filter_bounds(&region)
            .filter(Filter::gt("time_start", start.as_str()))
            .filter(Filter::lt("time_end", end.as_str()));
        let value = api.compute_value(&Expression::new(&index.aggregate_array("table_id")))?;
        let table_ids: Vec<String> = value
            .as_array()
            .ok_or_else(|| Error::external(format!("Unexpected GEDI index listing {value}")))?
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect();
        debug!("{} GEDI tables intersect {}", table_ids.len(), query.aoi);
        let tables = table_ids
            .iter()
            .map(|id| {
                FeatureCollection::load(id)
                    .filter_bounds(&region)
                    .filter(quality_filter())
            })
            .collect();
        Ok(Downloadable::Features(
            FeatureCollection::of(tables).flatten().select(&properties),
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
    fn test_raster_masks_and_mosaics() {
        let api = MockEarthEngine::default();
        let q = paris_query(CompositeMethod::Median, DType::UInt16, &[]);
        let Downloadable::Image(im) = GediRaster.get(&api, &q).unwrap() else {
            panic!("expected an image");
        };
        let names = function_names(&im);
        assert!(names.contains(&"ImageCollection.mosaic".to_string()));
        assert!(names.contains(&"Image.updateMask".to_string()));
        assert!(names.contains(&"Image.toUint16".to_string()));
        assert!(!GediRaster.check_clean());
    }

    #[test]
    fn test_vector_loads_listed_tables() {
        let api = MockEarthEngine::default();
        api.push_value(Ok(json!([
            "LARSE/GEDI/GEDI02_A_002/GEDI02_A_2023160_O25387_03_T05674_02_003_02_V002",
            "LARSE/GEDI/GEDI02_A_002/GEDI02_A_2023165_O25465_02_T10342_02_003_02_V002"
        ])));
        let q = paris_query(CompositeMethod::Median, DType::Float32, &[]);
        let Downloadable::Features(fc) = GediVector.get(&api, &q).unwrap() else {
            panic!("expected features");
        };
        let text = serde_json::to_string(&Expression::new(&fc.0)).unwrap();
        assert!(text.contains("T05674"));
        assert!(text.contains("T10342"));
        assert!(text.contains("Collection.flatten"));
        assert!(text.contains("orbit_number"));
        let index_request = serde_json::to_string(&api.value_requests.lock().unwrap()[0]).unwrap();
        assert!(index_request.contains(INDEX_COLLECTION));
        assert!(index_request.contains("2023-06-01"));
    }

    #[test]
    fn test_vector_rejects_unknown_property() {
        let api = MockEarthEngine::default();
        let q = paris_query(CompositeMethod::Median, DType::Float32, &["rh98", "canopy"]);
        assert!(matches!(
            GediVector.get(&api, &q),
            Err(Error::InvalidBand { .. })
        ));
        assert!(!GediVector.is_raster());
        assert!(!GediVector.check_clean());
    }

    #[test]
    fn test_quality_filter_covers_beams() {
        let text = serde_json::to_string(&Expression::new(&quality_filter().0)).unwrap();
        assert!(text.contains("sensitivity"));
        assert!(text.contains("\"beam\""));
        assert!(text.contains("Filter.rangeContains"));
    }
}
