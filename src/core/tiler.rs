//! Split an area of interest into a regular grid of tiles, and keep track of the
//! files those tiles are downloaded to.
//!
//! Without an explicit CRS every tile lives in the UTM zone it falls in, so large
//! areas end up as several tile grids, one per zone.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};

use crate::core::coords::{Crs, GeoBoundingBox, Polygon};
use crate::error::{Error, Result};
use crate::types::Format;

/// Upper bound on the number of grid cells a single split may enumerate.
pub const MAX_TILE_LIMIT: u64 = 100_000_000;

fn multiple_below(x: f64, step: f64) -> f64 {
    (x / step).floor() * step
}

fn multiple_above(x: f64, step: f64) -> f64 {
    (x / step).ceil() * step
}

/// Grid `region` with square cells of side `step`, aligned on multiples of `step`.
fn split_in_grid(region: &GeoBoundingBox, step: f64) -> Result<Vec<GeoBoundingBox>> {
    if step <= 0.0 {
        return Err(Error::InvalidArgument {
            arg: "tile_size",
            value: step.to_string(),
        });
    }
    let x0 = multiple_below(region.left, step);
    let x1 = multiple_above(region.right, step);
    let y0 = multiple_below(region.bottom, step);
    let y1 = multiple_above(region.top, step);
    let nx = (((x1 - x0) / step).round() as u64).max(1);
    let ny = (((y1 - y0) / step).round() as u64).max(1);
    if nx.saturating_mul(ny) > MAX_TILE_LIMIT {
        return Err(Error::Config(format!(
            "Tiling would produce {} tiles, more than the limit of {}. Use a larger tile_size.",
            nx.saturating_mul(ny),
            MAX_TILE_LIMIT
        )));
    }
    let mut tiles = Vec::with_capacity((nx * ny) as usize);
    for i in 0..nx {
        for j in 0..ny {
            let left = x0 + i as f64 * step;
            let bottom = y0 + j as f64 * step;
            tiles.push(GeoBoundingBox {
                left,
                bottom,
                right: left + step,
                top: bottom + step,
                crs: region.crs,
            });
        }
    }
    Ok(tiles)
}

fn passes_filter(tile: &GeoBoundingBox, filter: &[Polygon]) -> Result<bool> {
    if filter.is_empty() {
        return Ok(true);
    }
    let wgs = tile.transform(Crs::WGS84)?;
    touches_any(&wgs, filter)
}

fn touches_any(wgs: &GeoBoundingBox, filter: &[Polygon]) -> Result<bool> {
    for polygon in filter {
        if polygon.intersects_bbox(wgs)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Split `aoi` in square tiles of side `tile_size` (CRS units).
///
/// When `crs` is `None` the AOI is split per UTM zone and each tile is expressed in
/// its zone's CRS. `filter` polygons are WGS84; tiles outside all of them are dropped.
pub fn split(
    aoi: &GeoBoundingBox,
    tile_size: f64,
    crs: Option<Crs>,
    filter: &[Polygon],
) -> Result<Vec<GeoBoundingBox>> {
    let mut tiles = Vec::new();
    match crs {
        Some(crs) => {
            if !crs.is_metric() {
                warn!("Using a tiler with non-metric CRS.");
            }
            let region = aoi.transform(crs)?;
            for tile in split_in_grid(&region, tile_size)? {
                if passes_filter(&tile, filter)? {
                    tiles.push(tile);
                }
            }
        }
        None => {
            let aoi_wgs = aoi.transform(Crs::WGS84)?;
            for utm in aoi.to_utms()? {
                let cell = utm.bbox();
                let Some(inter) = cell.intersection(&aoi_wgs) else {
                    continue;
                };
                if inter.is_empty() {
                    continue;
                }
                let region = inter.transform(utm.crs())?;
                debug!("Tiling UTM cell {} in {}", utm, utm.crs());
                for tile in split_in_grid(&region, tile_size)? {
                    let wgs = tile.transform(Crs::WGS84)?;
                    if !wgs.intersects(&cell) {
                        continue;
                    }
                    if filter.is_empty() || touches_any(&wgs, filter)? {
                        tiles.push(tile);
                    }
                }
            }
        }
    }
    Ok(tiles)
}

/// Naming and bookkeeping of the files downloaded for one satellite.
#[derive(Debug, Clone)]
pub struct TileTracker {
    pub satellite_name: String,
    pub root: PathBuf,
    pub format: Option<Format>,
}

impl TileTracker {
    pub fn new(
        satellite_name: &str,
        data_dir: &Path,
        sub_root: Option<&str>,
        format: Option<Format>,
    ) -> Self {
        let mut root = data_dir.join(satellite_name);
        if let Some(sub) = sub_root {
            root = root.join(sub);
        }
        Self {
            satellite_name: satellite_name.to_string(),
            root,
            format,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self.format {
            Some(f) => f.extension(),
            None => "tif",
        }
    }

    pub fn name_crs(crs: Crs) -> String {
        crs.name()
    }

    /// `<root>/<sat>_<crs>_<left>_<bottom>.<ext>`
    pub fn get_path(&self, tile: &GeoBoundingBox) -> PathBuf {
        self.root.join(format!(
            "{}_{}_{:.0}_{:.0}.{}",
            self.satellite_name,
            Self::name_crs(tile.crs),
            tile.left,
            tile.bottom,
            self.extension()
        ))
    }

    /// Directory holding one tile's time series, named after the tile stem.
    pub fn get_time_series_dir(&self, tile: &GeoBoundingBox) -> PathBuf {
        self.root.join(format!(
            "{}_{}_{:.0}_{:.0}",
            self.satellite_name,
            Self::name_crs(tile.crs),
            tile.left,
            tile.bottom,
        ))
    }

    pub fn vrt_path(&self, crs_name: &str) -> PathBuf {
        self.root
            .join(format!("{}_{}.vrt", self.satellite_name, crs_name))
    }

    /// Tracked files in `root`, sorted. Hidden `._*` files are skipped.
    pub fn tracked_files(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let pattern = Regex::new(&format!(r".*\.{}$", regex::escape(self.extension())))
            .map_err(Error::external)?;
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
                continue;
            };
            if name.starts_with("._") || name.starts_with("merged.") {
                continue;
            }
            if pattern.is_match(&name) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Tracked files grouped by the CRS name embedded in their filename.
    pub fn crs_to_paths(&self) -> Result<BTreeMap<String, Vec<PathBuf>>> {
        let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for path in self.tracked_files()? {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            match parse_tile_filename(&name) {
                Some(parts) => groups.entry(parts.crs_name).or_default().push(path),
                None => warn!("Ignoring file with unexpected name {:?}", path),
            }
        }
        Ok(groups)
    }
}

/// Components of a tile filename such as `s1_UTM31N_440000_5410000.tif`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileFilename {
    pub satellite: String,
    pub crs_name: String,
    pub left: i64,
    pub bottom: i64,
}

impl TileFilename {
    pub fn tile_id(&self) -> String {
        format!("{}_{}_{}", self.crs_name, self.left, self.bottom)
    }
}

pub fn parse_tile_filename(name: &str) -> Option<TileFilename> {
    let re = Regex::new(
        r"^(?P<satellite>.+)_(?P<crs>UTM\d{1,2}[NS]|EPSG\d+)_(?P<left>-?\d+)_(?P<bottom>-?\d+)(\.\w+)?$",
    )
    .ok()?;
    let caps = re.captures(name)?;
    Some(TileFilename {
        satellite: caps["satellite"].to_string(),
        crs_name: caps["crs"].to_string(),
        left: caps["left"].parse().ok()?,
        bottom: caps["bottom"].parse().ok()?,
    })
}

pub fn tile_id_from_filename(name: &str) -> Option<String> {
    parse_tile_filename(name).map(|p| p.tile_id())
}

pub fn satellite_from_filename(name: &str) -> Option<String> {
    parse_tile_filename(name).map(|p| p.satellite)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lambert_aoi() -> GeoBoundingBox {
        GeoBoundingBox::new(650_000.0, 6_860_000.0, 660_000.0, 6_870_000.0, Crs(2154)).unwrap()
    }

    #[test]
    fn test_same_crs_tiles_have_exact_shape() {
        let tiles = split(&lambert_aoi(), 5000.0, Some(Crs(2154)), &[]).unwrap();
        assert_eq!(tiles.len(), 4);
        for t in &tiles {
            assert_eq!(t.width(), 5000.0);
            assert_eq!(t.height(), 5000.0);
            assert_eq!(t.crs, Crs(2154));
        }
    }

    #[test]
    fn test_tiles_do_not_overlap() {
        let tiles = split(&lambert_aoi(), 2500.0, Some(Crs(2154)), &[]).unwrap();
        assert_eq!(tiles.len(), 16);
        for (i, a) in tiles.iter().enumerate() {
            for b in tiles.iter().skip(i + 1) {
                assert!(!a.intersects(b));
            }
        }
    }

    #[test]
    fn test_unaligned_aoi_is_covered() {
        let aoi = GeoBoundingBox::new(1200.0, 300.0, 6100.0, 4900.0, Crs(2154)).unwrap();
        let tiles = split(&aoi, 5000.0, Some(Crs(2154)), &[]).unwrap();
        // x in [0, 10000), y in [0, 5000)
        assert_eq!(tiles.len(), 2);
        assert!(tiles.iter().all(|t| t.left % 5000.0 == 0.0));
    }

    #[test]
    fn test_utm_mode_uses_zone_crs() {
        let aoi =
            GeoBoundingBox::new(440_000.0, 5_410_000.0, 450_000.0, 5_420_000.0, Crs(32633))
                .unwrap();
        let tiles = split(&aoi, 5000.0, None, &[]).unwrap();
        assert!(!tiles.is_empty());
        assert!(tiles.iter().all(|t| t.crs == Crs(32633)));
    }

    #[test]
    fn test_filter_polygon_drops_tiles() {
        let aoi = GeoBoundingBox::new(0.0, 0.0, 20_000.0, 10_000.0, Crs(32631)).unwrap();
        let all = split(&aoi, 10_000.0, Some(Crs(32631)), &[]).unwrap();
        assert_eq!(all.len(), 2);
        let west = all
            .iter()
            .find(|t| t.left == 0.0)
            .unwrap()
            .transform(Crs::WGS84)
            .unwrap();
        let cx = (west.left + west.right) / 2.0;
        let cy = (west.bottom + west.top) / 2.0;
        let d = west.width() / 10.0;
        let poly = Polygon::new(vec![(cx - d, cy - d), (cx + d, cy - d), (cx, cy + d)]);
        let kept = split(&aoi, 10_000.0, Some(Crs(32631)), &[poly]).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].left, 0.0);
    }

    #[test]
    fn test_tracker_paths() {
        let tracker = TileTracker::new("s1", Path::new("/data"), None, None);
        let tile =
            GeoBoundingBox::new(650_000.0, 6_860_000.0, 655_000.0, 6_865_000.0, Crs(2154)).unwrap();
        assert_eq!(
            tracker.get_path(&tile),
            PathBuf::from("/data/s1/s1_EPSG2154_650000_6860000.tif")
        );
        assert_eq!(
            tracker.vrt_path("EPSG2154"),
            PathBuf::from("/data/s1/s1_EPSG2154.vrt")
        );
        let vec = TileTracker::new("gedi_vector", Path::new("/data"), None, Some(Format::Csv));
        assert!(vec.get_path(&tile).to_string_lossy().ends_with(".csv"));
    }

    #[test]
    fn test_filename_parsing() {
        let name = "dyn_world_UTM31N_440000_5410000.tif";
        assert_eq!(satellite_from_filename(name).as_deref(), Some("dyn_world"));
        assert_eq!(
            tile_id_from_filename(name).as_deref(),
            Some("UTM31N_440000_5410000")
        );
        assert!(parse_tile_filename("config.yaml").is_none());
    }

    #[test]
    fn test_tracked_files_and_groups() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TileTracker::new("s2", dir.path(), None, None);
        fs::create_dir_all(&tracker.root).unwrap();
        for name in [
            "s2_UTM31N_0_0.tif",
            "s2_UTM31N_5000_0.tif",
            "s2_UTM32N_0_0.tif",
            "._s2_UTM31N_0_0.tif",
            "config.yaml",
        ] {
            fs::write(tracker.root.join(name), b"x").unwrap();
        }
        assert_eq!(tracker.tracked_files().unwrap().len(), 3);
        let groups = tracker.crs_to_paths().unwrap();
        assert_eq!(groups["UTM31N"].len(), 2);
        assert_eq!(groups["UTM32N"].len(), 1);
    }
}
