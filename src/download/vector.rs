//! Vector chips through `table:computeFeatures`.
use std::path::Path;

use serde_json::Value as Json;
use tracing::debug;

use crate::core::coords::{Crs, GeoBoundingBox};
use crate::ee::{EarthEngineApi, Expression, FeatureCollection, Geometry};
use crate::error::Result;
use crate::io::writers::vector::{reproject_points, write_features};
use crate::types::Format;

use super::raster::MAX_SPLIT_DEPTH;

fn quadrants(b: &GeoBoundingBox) -> [GeoBoundingBox; 4] {
    let mx = (b.left + b.right) / 2.0;
    let my = (b.bottom + b.top) / 2.0;
    let q = |left, bottom, right, top| GeoBoundingBox {
        left,
        bottom,
        right,
        top,
        crs: b.crs,
    };
    [
        q(b.left, my, mx, b.top),
        q(mx, my, b.right, b.top),
        q(b.left, b.bottom, mx, my),
        q(mx, b.bottom, b.right, my),
    ]
}

fn fetch(
    api: &dyn EarthEngineApi,
    collection: &FeatureCollection,
    region: &GeoBoundingBox,
    depth: usize,
    features: &mut Vec<Json>,
) -> Result<()> {
    let expression = Expression::new(&collection.filter_bounds(&Geometry::bbox(region)?).0);
    match api.compute_all_features(&expression) {
        Ok(page) => {
            features.extend(page);
            Ok(())
        }
        Err(e) if e.is_too_large() && depth < MAX_SPLIT_DEPTH => {
            debug!("Too many features in {}, splitting", region);
            for quadrant in quadrants(region) {
                fetch(api, collection, &quadrant, depth + 1, features)?;
            }
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Download the features of `collection` inside `tile` into `out`, reprojected to the
/// tile's CRS. Returns the number of features written.
pub fn download_features(
    api: &dyn EarthEngineApi,
    collection: &FeatureCollection,
    tile: &GeoBoundingBox,
    format: Format,
    out: &Path,
) -> Result<usize> {
    let mut features = Vec::new();
    fetch(api, collection, tile, 0, &mut features)?;
    reproject_points(&mut features, Crs::WGS84, tile.crs)?;
    write_features(out, format, &features, tile.crs)?;
    Ok(features.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ee::client::tests::MockEarthEngine;
    use crate::ee::{EeError, FeaturePage};
    use crate::io::writers::vector::{read_csv, read_geojson};
    use serde_json::json;

    fn tile() -> GeoBoundingBox {
        GeoBoundingBox::new(650_000.0, 6_860_000.0, 652_000.0, 6_862_000.0, Crs(2154)).unwrap()
    }

    fn shot(lon: f64, lat: f64) -> Json {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [lon, lat] },
            "properties": { "rh98": 24.5, "orbit_number": 1234 }
        })
    }

    #[test]
    fn test_features_are_reprojected_to_tile_crs() {
        let mock = MockEarthEngine::default();
        mock.push_page(Ok(FeaturePage {
            features: vec![shot(2.35, 48.85)],
            next_page_token: None,
        }));
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("gedi_vector_EPSG2154_650000_6860000.geojson");
        let n = download_features(
            &mock,
            &FeatureCollection::load("LARSE/GEDI/GEDI02_A_002/x"),
            &tile(),
            Format::Geojson,
            &out,
        )
        .unwrap();
        assert_eq!(n, 1);
        let (features, crs) = read_geojson(&out).unwrap();
        assert_eq!(crs, Crs(2154));
        let x = features[0]["geometry"]["coordinates"][0].as_f64().unwrap();
        assert!(x > 600_000.0, "x={x}");
    }

    #[test]
    fn test_too_many_features_split_in_quadrants() {
        let mock = MockEarthEngine::default();
        mock.push_page(Err(EeError::Api {
            status: 400,
            message: "Collection query aborted after accumulating over 5000 elements; too large"
                .into(),
        }));
        for _ in 0..4 {
            mock.push_page(Ok(FeaturePage {
                features: vec![shot(2.35, 48.85)],
                next_page_token: None,
            }));
        }
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("chip.csv");
        let n = download_features(
            &mock,
            &FeatureCollection::load("x"),
            &tile(),
            Format::Csv,
            &out,
        )
        .unwrap();
        assert_eq!(n, 4);
        assert_eq!(read_csv(&out).unwrap().len(), 4);
    }

    #[test]
    fn test_quadrants_share_the_tile() {
        let qs = quadrants(&tile());
        let area: f64 = qs.iter().map(|q| q.area()).sum();
        assert!((area - tile().area()).abs() < 1e-6);
        assert_eq!(qs[3].right, 652_000.0);
    }
}
