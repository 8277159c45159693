//! Country footprints used to restrict tiling to a country's mainland.
//!
//! Borders come from the world administrative boundaries dataset, downloaded once
//! and cached in the user cache directory.
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value as Json;
use tracing::{debug, info};

use crate::core::coords::Polygon;
use crate::error::{Error, Result};

pub const COUNTRY_BORDERS_URL: &str = "https://public.opendatasoft.com/api/explore/v2.1/catalog/datasets/world-administrative-boundaries/exports/geojson";
const CACHE_FILE: &str = "world-administrative-boundaries.geojson";

fn cache_path() -> Result<PathBuf> {
    let dir = dirs::cache_dir()
        .ok_or_else(|| Error::Config("No user cache directory".into()))?
        .join("geefetch");
    fs::create_dir_all(&dir)?;
    Ok(dir.join(CACHE_FILE))
}

/// Borders GeoJSON, downloaded on first use.
pub fn country_borders() -> Result<Json> {
    let path = cache_path()?;
    if !path.exists() {
        info!("Downloading country borders from {}", COUNTRY_BORDERS_URL);
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(Error::external)?;
        let bytes = client
            .get(COUNTRY_BORDERS_URL)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.bytes())
            .map_err(Error::external)?;
        let tmp = path.with_extension("part");
        fs::write(&tmp, &bytes)?;
        fs::rename(&tmp, &path)?;
    }
    debug!("Country borders cached at {:?}", path);
    Ok(serde_json::from_slice(&fs::read(&path)?)?)
}

fn ring(coords: &Json) -> Option<Polygon> {
    let points = coords
        .as_array()?
        .iter()
        .map(|p| Some((p.get(0)?.as_f64()?, p.get(1)?.as_f64()?)))
        .collect::<Option<Vec<_>>>()?;
    Some(Polygon::new(points))
}

/// Largest outer ring of a Polygon or MultiPolygon geometry.
pub fn mainland(geometry: &Json) -> Result<Polygon> {
    let kind = geometry.get("type").and_then(Json::as_str).unwrap_or_default();
    let coords = geometry.get("coordinates");
    let outer_rings: Vec<Polygon> = match (kind, coords) {
        ("Polygon", Some(c)) => c.get(0).and_then(ring).into_iter().collect(),
        ("MultiPolygon", Some(Json::Array(polys))) => polys
            .iter()
            .filter_map(|p| p.get(0).and_then(ring))
            .collect(),
        _ => {
            return Err(Error::Unsupported(format!(
                "Geometry of type {kind:?} cannot be interpreted as a country border shape."
            )));
        }
    };
    let mut largest: Option<(f64, Polygon)> = None;
    for ring in outer_rings {
        let area = ring.area()?;
        if largest.as_ref().is_none_or(|(best, _)| area > *best) {
            largest = Some((area, ring));
        }
    }
    largest
        .map(|(_, ring)| ring)
        .ok_or_else(|| Error::Config("Empty country shape.".into()))
}

/// Mainland of each country in `names`, looked up in `borders`.
pub fn country_polygons(borders: &Json, names: &[String]) -> Result<Vec<Polygon>> {
    let features = borders
        .get("features")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::Config("Country borders have no features".into()))?;
    let name_of = |f: &Json| {
        f.get("properties")
            .and_then(|p| p.get("name"))
            .and_then(Json::as_str)
            .map(str::to_string)
    };
    let mut polygons = Vec::with_capacity(names.len());
    for name in names {
        let Some(feature) = features.iter().find(|f| name_of(f).as_deref() == Some(name)) else {
            let suggestion = features
                .iter()
                .filter_map(name_of)
                .min_by_key(|candidate| strsim::levenshtein(name, candidate))
                .unwrap_or_default();
            return Err(Error::UnknownCountry {
                name: name.clone(),
                suggestion,
            });
        };
        let geometry = feature.get("geometry").unwrap_or(&Json::Null);
        polygons.push(mainland(geometry)?);
    }
    Ok(polygons)
}

/// Mainland footprints of `names`, downloading the borders if needed.
pub fn load_country_filter(names: &[String]) -> Result<Vec<Polygon>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    country_polygons(&country_borders()?, names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn borders() -> Json {
        json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": { "name": "France" },
                    "geometry": {
                        "type": "MultiPolygon",
                        "coordinates": [
                            [[[8.5, 41.4], [9.6, 41.4], [9.6, 43.0], [8.5, 43.0], [8.5, 41.4]]],
                            [[[-4.8, 42.3], [8.2, 42.3], [8.2, 51.1], [-4.8, 51.1], [-4.8, 42.3]]]
                        ]
                    }
                },
                {
                    "type": "Feature",
                    "properties": { "name": "Spain" },
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[[-9.3, 36.0], [3.3, 36.0], [3.3, 43.8], [-9.3, 43.8], [-9.3, 36.0]]]
                    }
                }
            ]
        })
    }

    #[test]
    fn test_mainland_is_largest_polygon() {
        let polys = country_polygons(&borders(), &["France".to_string()]).unwrap();
        assert_eq!(polys.len(), 1);
        // Corsica is dropped
        assert!(!polys[0].contains_point(9.0, 42.0).unwrap());
        assert!(polys[0].contains_point(2.35, 48.85).unwrap());
    }

    #[test]
    fn test_several_countries() {
        let names = vec!["France".to_string(), "Spain".to_string()];
        assert_eq!(country_polygons(&borders(), &names).unwrap().len(), 2);
    }

    #[test]
    fn test_unknown_country_suggests() {
        let err = country_polygons(&borders(), &["Frence".to_string()]).unwrap_err();
        match err {
            Error::UnknownCountry { suggestion, .. } => assert_eq!(suggestion, "France"),
            other => panic!("unexpected {other}"),
        }
    }
}
