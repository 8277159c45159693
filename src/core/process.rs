//! Post-download checks and aggregation: clean-chip predicates, removal of bad
//! chips, merging of vector tiles and VRT mosaics.
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::core::coords::Crs;
use crate::core::tiler::{TileTracker, parse_tile_filename};
use crate::error::{Error, Result};
use crate::io::GeoTiffReader;
use crate::io::writers::vector::{
    count_features, format_of, read_csv, read_geojson, reproject_points, write_csv, write_geojson,
};
use crate::io::writers::write_vrt;
use crate::types::Format;

/// Minimum valid-pixel fraction of a raster chip.
pub const RASTER_MIN_VALID_FRACTION: f64 = 0.9 / 255.0;
/// Minimum valid-pixel fraction of a GEDI raster chip, whose footprints are sparse.
pub const GEDI_MIN_VALID_FRACTION: f64 = 0.005 / 255.0;

fn valid_fraction_at_least(path: &Path, threshold: f64) -> bool {
    match GeoTiffReader::open(path).and_then(|r| r.valid_fraction()) {
        Ok(fraction) => {
            debug!("{:?} has {:.4} valid pixels", path, fraction);
            fraction >= threshold
        }
        Err(e) => {
            debug!("Cannot read {:?}: {}", path, e);
            false
        }
    }
}

/// The GeoTIFF opens and holds enough valid pixels.
pub fn tif_is_clean(path: &Path) -> bool {
    valid_fraction_at_least(path, RASTER_MIN_VALID_FRACTION)
}

pub fn gedi_is_clean(path: &Path) -> bool {
    valid_fraction_at_least(path, GEDI_MIN_VALID_FRACTION)
}

/// The GeoTIFF opens through GDAL, whatever its content.
pub fn tif_is_readable(path: &Path) -> bool {
    GeoTiffReader::open(path).is_ok()
}

/// The vector file parses, possibly without any feature.
pub fn vector_is_readable(path: &Path) -> bool {
    format_of(path)
        .and_then(|format| count_features(path, format))
        .is_ok()
}

/// The vector file parses and holds at least one feature.
pub fn vector_is_clean(path: &Path) -> bool {
    let Ok(format) = format_of(path) else {
        return false;
    };
    matches!(count_features(path, format), Ok(n) if n > 0)
}

/// Remove the tracked files failing `is_clean`. Returns how many were removed.
pub fn clean(tracker: &TileTracker, is_clean: impl Fn(&Path) -> bool) -> Result<usize> {
    let mut removed = 0;
    for path in tracker.tracked_files()? {
        if !is_clean(&path) {
            warn!("Removing corrupted or empty file {:?}", path);
            fs::remove_file(&path)?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn merged_path(tracker: &TileTracker, format: Format) -> Result<PathBuf> {
    let path = tracker.root.join(format!("merged.{}", format.extension()));
    if path.exists() {
        return Err(Error::Config(format!(
            "Merged file {} already exists.",
            path.display()
        )));
    }
    Ok(path)
}

fn tile_crs(path: &Path) -> Option<Crs> {
    let name = path.file_name()?.to_str()?;
    Crs::from_name(&parse_tile_filename(name)?.crs_name)
}

/// Load all tiles of `tracker` as features in one CRS: the tiles' CRS when they
/// share one, WGS84 otherwise.
fn collect_features(
    tracker: &TileTracker,
    format: Format,
) -> Result<Option<(Vec<Json>, Crs)>> {
    let mut tiles = Vec::new();
    for path in tracker.tracked_files()? {
        let (features, crs) = match format {
            Format::Geojson => read_geojson(&path)?,
            Format::Csv => (read_csv(&path)?, tile_crs(&path).unwrap_or(Crs::WGS84)),
        };
        tiles.push((features, crs));
    }
    if tiles.is_empty() {
        return Ok(None);
    }
    let crss: BTreeSet<Crs> = tiles.iter().map(|(_, crs)| *crs).collect();
    let target = match crss.iter().next() {
        Some(crs) if crss.len() == 1 => *crs,
        _ => Crs::WGS84,
    };
    let mut merged = Vec::new();
    for (mut features, crs) in tiles {
        reproject_points(&mut features, crs, target)?;
        merged.extend(features);
    }
    Ok(Some((merged, target)))
}

fn merge(tracker: &TileTracker, format: Format) -> Result<PathBuf> {
    let out = merged_path(tracker, format)?;
    let Some((features, crs)) = collect_features(tracker, format)? else {
        return Err(Error::Config(format!(
            "No {} file to merge in {}.",
            format,
            tracker.root.display()
        )));
    };
    match format {
        Format::Geojson => write_geojson(&out, &features, crs)?,
        Format::Csv => write_csv(&out, &features)?,
    }
    info!("Merged {} features into {:?}", features.len(), out);
    Ok(out)
}

/// Merge every tracked GeoJSON tile into `merged.geojson`.
pub fn merge_geojson(tracker: &TileTracker) -> Result<PathBuf> {
    merge(tracker, Format::Geojson)
}

/// Merge every tracked CSV tile into `merged.csv`.
pub fn merge_csv(tracker: &TileTracker) -> Result<PathBuf> {
    merge(tracker, Format::Csv)
}

/// Mosaic `files` into the VRT at `path`, replacing an existing one.
pub fn create_vrt(path: &Path, files: &[PathBuf]) -> Result<()> {
    if path.extension().and_then(|e| e.to_str()) != Some("vrt") {
        return Err(Error::InvalidArgument {
            arg: "vrt path",
            value: path.display().to_string(),
        });
    }
    if files.is_empty() {
        return Err(Error::Config(format!(
            "No file to mosaic into {}.",
            path.display()
        )));
    }
    if path.exists() {
        warn!("Overwriting existing VRT {:?}", path);
        fs::remove_file(path)?;
    }
    write_vrt(path, files)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::writers::tiff::{RasterLayout, write_geotiff};
    use crate::types::DType;
    use ndarray::Array2;
    use serde_json::json;

    fn chip(path: &Path, valid: usize) {
        let mut data = vec![0.0; 100 * 100];
        for v in data.iter_mut().take(valid) {
            *v = 7.0;
        }
        let layout = RasterLayout {
            width: 100,
            height: 100,
            geo_transform: [0.0, 10.0, 0.0, 1000.0, 0.0, -10.0],
            projection: String::new(),
            band_names: vec!["rh98".into()],
            dtype: DType::UInt8,
        };
        write_geotiff(path, &layout, &[Array2::from_shape_vec((100, 100), data).unwrap()])
            .unwrap();
    }

    #[test]
    fn test_clean_thresholds() {
        let dir = tempfile::tempdir().unwrap();
        let sparse = dir.path().join("sparse.tif");
        // 1 valid pixel out of 10000: below 0.9/255, above 0.005/255
        chip(&sparse, 1);
        assert!(!tif_is_clean(&sparse));
        assert!(gedi_is_clean(&sparse));
        let dense = dir.path().join("dense.tif");
        chip(&dense, 5000);
        assert!(tif_is_clean(&dense));
        let empty = dir.path().join("empty.tif");
        chip(&empty, 0);
        assert!(!gedi_is_clean(&empty));
        assert!(!tif_is_clean(&dir.path().join("missing.tif")));
    }

    #[test]
    fn test_clean_removes_bad_chips() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TileTracker::new("s1", dir.path(), None, None);
        fs::create_dir_all(&tracker.root).unwrap();
        chip(&tracker.root.join("s1_UTM31N_440000_5410000.tif"), 5000);
        chip(&tracker.root.join("s1_UTM31N_460000_5410000.tif"), 0);
        assert_eq!(clean(&tracker, tif_is_clean).unwrap(), 1);
        assert_eq!(tracker.tracked_files().unwrap().len(), 1);
    }

    fn vector_tracker(dir: &Path, format: Format) -> TileTracker {
        let tracker = TileTracker::new("gedi_vector", dir, None, Some(format));
        fs::create_dir_all(&tracker.root).unwrap();
        tracker
    }

    fn footprint(x: f64, y: f64) -> Json {
        json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [x, y] },
            "properties": { "rh98": 18.0 }
        })
    }

    #[test]
    fn test_merge_geojson_same_crs() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = vector_tracker(dir.path(), Format::Geojson);
        for left in [440_000.0, 460_000.0] {
            let path = tracker.root.join(format!("gedi_vector_UTM31N_{left}_5410000.geojson"));
            write_geojson(&path, &[footprint(left + 5.0, 5_410_005.0)], Crs(32631)).unwrap();
        }
        let empty = tracker.root.join("gedi_vector_UTM31N_480000_5410000.geojson");
        write_geojson(&empty, &[], Crs(32631)).unwrap();
        assert!(!vector_is_clean(&empty));

        let merged = merge_geojson(&tracker).unwrap();
        let (features, crs) = read_geojson(&merged).unwrap();
        assert_eq!(crs, Crs(32631));
        assert_eq!(features.len(), 2);
        assert!(vector_is_clean(&merged));
        // refuses to overwrite
        assert!(merge_geojson(&tracker).is_err());
    }

    #[test]
    fn test_merge_csv_mixed_crs_goes_to_wgs84() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = vector_tracker(dir.path(), Format::Csv);
        write_csv(
            &tracker.root.join("gedi_vector_UTM31N_440000_5410000.csv"),
            &[footprint(440_005.0, 5_410_005.0)],
        )
        .unwrap();
        write_csv(
            &tracker.root.join("gedi_vector_UTM32N_280000_5410000.csv"),
            &[footprint(280_005.0, 5_410_005.0)],
        )
        .unwrap();
        let merged = merge_csv(&tracker).unwrap();
        let features = read_csv(&merged).unwrap();
        assert_eq!(features.len(), 2);
        let lon = features[0]["geometry"]["coordinates"][0].as_f64().unwrap();
        assert!(lon > 0.0 && lon < 12.0, "lon={lon}");
    }

    #[test]
    fn test_merge_without_files_fails() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = vector_tracker(dir.path(), Format::Geojson);
        assert!(merge_geojson(&tracker).is_err());
    }

    #[test]
    fn test_create_vrt_requires_extension() {
        let dir = tempfile::tempdir().unwrap();
        let tif = dir.path().join("a.tif");
        chip(&tif, 100);
        assert!(create_vrt(&dir.path().join("a.tif.mosaic"), &[tif.clone()]).is_err());
        let vrt = dir.path().join("s1_UTM31N.vrt");
        create_vrt(&vrt, &[tif.clone()]).unwrap();
        // second call overwrites
        create_vrt(&vrt, &[tif]).unwrap();
        assert!(vrt.exists());
    }
}
