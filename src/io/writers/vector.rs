//! GeoJSON and CSV output for point features returned by Earth Engine.
//!
//! Features are kept as GeoJSON `Feature` objects. CSV rows hold the sorted union of
//! properties followed by a `geometry` column in WKT.
use gdal::vector::{Geometry, OGRwkbGeometryType};
use serde_json::{Map, Value as Json, json};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::core::coords::{Crs, transform_coords};
use crate::error::{Error, Result};
use crate::io::GdalError;
use crate::types::Format;

const GEOMETRY_COLUMN: &str = "geometry";

fn point_of(feature: &Json) -> Option<(f64, f64)> {
    let geometry = feature.get("geometry")?;
    if geometry.get("type")?.as_str()? != "Point" {
        return None;
    }
    let coords = geometry.get("coordinates")?.as_array()?;
    Some((coords.first()?.as_f64()?, coords.get(1)?.as_f64()?))
}

/// Reproject the point geometries of `features` in place. Other geometries are left as is.
pub fn reproject_points(features: &mut [Json], from: Crs, to: Crs) -> Result<()> {
    if from == to {
        return Ok(());
    }
    let idx: Vec<usize> = (0..features.len())
        .filter(|i| point_of(&features[*i]).is_some())
        .collect();
    let (mut xs, mut ys): (Vec<f64>, Vec<f64>) = idx
        .iter()
        .filter_map(|i| point_of(&features[*i]))
        .unzip();
    if xs.is_empty() {
        return Ok(());
    }
    transform_coords(from, to, &mut xs, &mut ys)?;
    for (k, i) in idx.into_iter().enumerate() {
        features[i]["geometry"]["coordinates"] = json!([xs[k], ys[k]]);
    }
    Ok(())
}

fn crs_member(crs: Crs) -> Json {
    json!({
        "type": "name",
        "properties": { "name": format!("urn:ogc:def:crs:EPSG::{}", crs.epsg()) }
    })
}

fn parse_crs_member(collection: &Json) -> Option<Crs> {
    let name = collection.get("crs")?.get("properties")?.get("name")?.as_str()?;
    name.rsplit(':').next()?.parse().ok().map(Crs)
}

pub fn write_geojson(path: &Path, features: &[Json], crs: Crs) -> Result<()> {
    let collection = json!({
        "type": "FeatureCollection",
        "crs": crs_member(crs),
        "features": features,
    });
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(writer, &collection)?;
    Ok(())
}

/// Features of a GeoJSON file and its CRS (WGS84 when unspecified).
pub fn read_geojson(path: &Path) -> Result<(Vec<Json>, Crs)> {
    let collection: Json = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    let crs = parse_crs_member(&collection).unwrap_or(Crs::WGS84);
    let features = collection
        .get("features")
        .and_then(Json::as_array)
        .cloned()
        .unwrap_or_default();
    Ok((features, crs))
}

fn cell(value: &Json) -> String {
    match value {
        Json::Null => String::new(),
        Json::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn wkt_point(feature: &Json) -> Result<String> {
    let Some(point) = point_of(feature) else {
        return Ok(String::new());
    };
    let mut geometry = Geometry::empty(OGRwkbGeometryType::wkbPoint).map_err(GdalError::from)?;
    geometry.add_point_2d(point);
    Ok(geometry.wkt().map_err(GdalError::from)?)
}

fn parse_wkt_point(wkt: &str) -> Option<(f64, f64)> {
    let geometry = Geometry::from_wkt(wkt).ok()?;
    if geometry.geometry_type() != OGRwkbGeometryType::wkbPoint {
        return None;
    }
    let (x, y, _) = geometry.get_point(0);
    Some((x, y))
}

pub fn write_csv(path: &Path, features: &[Json]) -> Result<()> {
    let mut columns = BTreeSet::new();
    for f in features {
        if let Some(props) = f.get("properties").and_then(Json::as_object) {
            columns.extend(props.keys().cloned());
        }
    }
    let mut writer = csv::Writer::from_path(path)?;
    let mut header: Vec<&str> = columns.iter().map(String::as_str).collect();
    header.push(GEOMETRY_COLUMN);
    writer.write_record(&header)?;
    for f in features {
        let props = f.get("properties");
        let mut row: Vec<String> = columns
            .iter()
            .map(|c| props.and_then(|p| p.get(c)).map(cell).unwrap_or_default())
            .collect();
        row.push(wkt_point(f)?);
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Rows of a CSV file back as GeoJSON features. Numeric cells are parsed as numbers.
pub fn read_csv(path: &Path) -> Result<Vec<Json>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut features = Vec::new();
    for record in reader.records() {
        let record = record?;
        let mut properties = Map::new();
        let mut geometry = Json::Null;
        for (name, value) in headers.iter().zip(record.iter()) {
            if name == GEOMETRY_COLUMN {
                if let Some((x, y)) = parse_wkt_point(value) {
                    geometry = json!({ "type": "Point", "coordinates": [x, y] });
                }
                continue;
            }
            let parsed = if value.is_empty() {
                Json::Null
            } else if let Ok(v) = value.parse::<i64>() {
                json!(v)
            } else if let Ok(v) = value.parse::<f64>() {
                json!(v)
            } else {
                json!(value)
            };
            properties.insert(name.to_string(), parsed);
        }
        features.push(json!({
            "type": "Feature",
            "geometry": geometry,
            "properties": properties,
        }));
    }
    Ok(features)
}

pub fn write_features(path: &Path, format: Format, features: &[Json], crs: Crs) -> Result<()> {
    match format {
        Format::Geojson => write_geojson(path, features, crs),
        Format::Csv => write_csv(path, features),
    }
}

/// Number of features in a vector file.
pub fn count_features(path: &Path, format: Format) -> Result<usize> {
    match format {
        Format::Geojson => Ok(read_geojson(path)?.0.len()),
        Format::Csv => {
            let mut reader = csv::Reader::from_path(path)?;
            let mut n = 0;
            for record in reader.records() {
                record?;
                n += 1;
            }
            Ok(n)
        }
    }
}

pub fn format_of(path: &Path) -> Result<Format> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("geojson") => Ok(Format::Geojson),
        Some("csv") => Ok(Format::Csv),
        _ => Err(Error::Unsupported(format!(
            "Unknown vector format for {}",
            path.display()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn footprint(lon: f64, lat: f64, rh98: f64) -> Json {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [lon, lat] },
            "properties": { "rh98": rh98, "orbit_number": 25387 }
        })
    }

    #[test]
    fn test_geojson_keeps_crs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gedi_vector_EPSG2154_650000_6860000.geojson");
        write_geojson(&path, &[footprint(651_000.0, 6_861_000.0, 21.5)], Crs(2154)).unwrap();
        let (features, crs) = read_geojson(&path).unwrap();
        assert_eq!(crs, Crs(2154));
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["rh98"], 21.5);
        assert_eq!(count_features(&path, Format::Geojson).unwrap(), 1);
    }

    #[test]
    fn test_csv_rows_and_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gedi.csv");
        let features = vec![footprint(2.35, 48.85, 12.0), footprint(2.36, 48.86, 30.25)];
        write_csv(&path, &features).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("orbit_number,rh98,geometry"));
        assert!(text.contains("POINT (2.35 48.85)"));
        let back = read_csv(&path).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[1]["properties"]["rh98"], 30.25);
        assert_eq!(back[1]["geometry"]["coordinates"][0], 2.36);
        assert_eq!(count_features(&path, Format::Csv).unwrap(), 2);
    }

    #[test]
    fn test_reproject_points_to_lambert() {
        let mut features = vec![footprint(2.35, 48.85, 12.0)];
        reproject_points(&mut features, Crs::WGS84, Crs(2154)).unwrap();
        let (x, y) = point_of(&features[0]).unwrap();
        assert!((x - 652_000.0).abs() < 2_000.0, "x={x}");
        assert!((y - 6_862_000.0).abs() < 2_000.0, "y={y}");
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(format_of(Path::new("merged.csv")).unwrap(), Format::Csv);
        assert!(format_of(Path::new("a.shp")).is_err());
    }
}
