//! YAML configuration: loading, per-satellite resolution against
//! `satellite_default`, and the config snapshot kept next to downloaded data.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value as Yaml};
use similar::{ChangeTag, TextDiff};
use tracing::{debug, error};

use crate::core::coords::{Crs, GeoBoundingBox};
use crate::error::{Error, Result};
use crate::types::{CompositeMethod, DType, Format, P2Orbit, S1Orbit};

/// A scalar or a list of scalars in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s.clone()],
            OneOrMany::Many(v) => v.clone(),
        }
    }
}

fn default_project() -> OneOrMany {
    OneOrMany::One("my-ee-project".to_string())
}

fn default_max_tile_size() -> u64 {
    10
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeeConfig {
    /// Cloud project(s) billed for Earth Engine requests; several are used round-robin.
    #[serde(default = "default_project")]
    pub ee_project_id: OneOrMany,
    /// Request size bound, in MB.
    #[serde(default = "default_max_tile_size")]
    pub max_tile_size: u64,
}

impl Default for GeeConfig {
    fn default() -> Self {
        Self {
            ee_project_id: default_project(),
            max_tile_size: default_max_tile_size(),
        }
    }
}

fn default_epsg() -> u32 {
    4326
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialAoiConfig {
    pub left: f64,
    pub right: f64,
    pub top: f64,
    pub bottom: f64,
    /// CRS of the bounds. Anything but 4326 is also the CRS of the tiles.
    #[serde(default = "default_epsg")]
    pub epsg: u32,
}

impl SpatialAoiConfig {
    pub fn as_bbox(&self) -> Result<GeoBoundingBox> {
        GeoBoundingBox::new(self.left, self.bottom, self.right, self.top, Crs(self.epsg))
    }

    /// Tiling CRS, or `None` for one UTM grid per zone.
    pub fn tiling_crs(&self) -> Option<Crs> {
        if self.epsg == Crs::WGS84.epsg() {
            None
        } else {
            Some(Crs(self.epsg))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalAoiConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AoiConfig {
    pub spatial: SpatialAoiConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<TemporalAoiConfig>,
    /// Country name(s) restricting the AOI to their mainland.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<OneOrMany>,
}

impl AoiConfig {
    pub fn start_date(&self) -> Option<NaiveDate> {
        self.temporal.as_ref().map(|t| t.start_date)
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.temporal.as_ref().map(|t| t.end_date)
    }
}

fn default_tile_size() -> f64 {
    5000.0
}

fn default_resolution() -> f64 {
    10.0
}

fn default_dtype() -> DType {
    DType::Float32
}

fn default_composite_method() -> CompositeMethod {
    CompositeMethod::Median
}

/// Settings shared by every satellite; `satellite_default` has this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteConfig {
    pub aoi: AoiConfig,
    #[serde(default)]
    pub gee: GeeConfig,
    /// Tile side, in pixels; tiles span `tile_size * resolution` CRS units.
    #[serde(default = "default_tile_size")]
    pub tile_size: f64,
    /// Pixel size, in metres.
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default = "default_dtype")]
    pub dtype: DType,
    #[serde(default = "default_composite_method")]
    pub composite_method: CompositeMethod,
    #[serde(default)]
    pub selected_bands: Option<Vec<String>>,
}

fn default_s1_orbit() -> S1Orbit {
    S1Orbit::Ascending
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S1Config {
    #[serde(flatten)]
    pub base: SatelliteConfig,
    #[serde(default = "default_s1_orbit")]
    pub orbit: S1Orbit,
    /// Boxcar radius in pixels.
    #[serde(default)]
    pub speckle_filter: Option<u32>,
    #[serde(default)]
    pub terrain_normalization: bool,
}

fn default_forty() -> i32 {
    40
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S2Config {
    #[serde(flatten)]
    pub base: SatelliteConfig,
    /// Portion of the scene (%) that must be cloud free.
    #[serde(default = "default_forty")]
    pub cloudless_portion: i32,
    /// Cloud probability (%) above which a pixel is masked.
    #[serde(default = "default_forty")]
    pub cloud_prb_threshold: i32,
}

fn default_p2_orbit() -> P2Orbit {
    P2Orbit::Descending
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palsar2Config {
    #[serde(flatten)]
    pub base: SatelliteConfig,
    #[serde(default = "default_p2_orbit")]
    pub orbit: P2Orbit,
}

fn default_format() -> Format {
    Format::Geojson
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GediConfig {
    #[serde(flatten)]
    pub base: SatelliteConfig,
    /// Vector output format.
    #[serde(default = "default_format")]
    pub format: Format,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomConfig {
    #[serde(flatten)]
    pub base: SatelliteConfig,
    /// Earth Engine asset id of an image or image collection.
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_range: Option<(f64, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeefetchConfig {
    pub data_dir: PathBuf,
    pub satellite_default: SatelliteConfig,
    pub s1: Option<S1Config>,
    pub s2: Option<S2Config>,
    pub dynworld: Option<SatelliteConfig>,
    pub landsat8: Option<SatelliteConfig>,
    pub nasadem: Option<SatelliteConfig>,
    pub palsar2: Option<Palsar2Config>,
    pub gedi: Option<GediConfig>,
    pub customs: BTreeMap<String, CustomConfig>,
}

/// Recursively merge `over` into `base`; mappings merge key by key, anything else replaces.
pub fn deep_merge(base: &mut Yaml, over: Yaml) {
    match (base, over) {
        (Yaml::Mapping(b), Yaml::Mapping(o)) => {
            for (k, v) in o {
                match b.get_mut(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => {
                        b.insert(k, v);
                    }
                }
            }
        }
        (_, Yaml::Null) => {}
        (b, o) => *b = o,
    }
}

fn read_yaml(path: &Path) -> Result<Yaml> {
    let text = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Raw YAML of a file, or of all `*.yaml` files of a directory merged in name order.
pub fn load_raw(path: &Path) -> Result<Yaml> {
    if !path.is_dir() {
        return read_yaml(path);
    }
    let mut files: Vec<PathBuf> = fs::read_dir(path)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("yaml"))
        .collect();
    files.sort();
    let mut merged = Yaml::Mapping(Mapping::new());
    for file in files {
        debug!("Merging config file {:?}", file);
        deep_merge(&mut merged, read_yaml(&file)?);
    }
    Ok(merged)
}

fn expand_data_dir(raw: &str) -> Result<PathBuf> {
    let path = match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .ok_or_else(|| Error::Config("Cannot expand ~ without a home directory".into()))?
            .join(rest),
        None => PathBuf::from(raw),
    };
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

/// `satellite_default` overridden by the block named `key`, if the block exists.
fn resolve_block<T: for<'de> Deserialize<'de>>(
    root: &Mapping,
    default: &Yaml,
    key: &str,
) -> Result<Option<T>> {
    let Some(block) = root.get(key) else {
        return Ok(None);
    };
    let mut merged = default.clone();
    deep_merge(&mut merged, block.clone());
    serde_yaml::from_value(merged)
        .map(Some)
        .map_err(|e| Error::Config(format!("{key}: {e}")))
}

impl GeefetchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_yaml(load_raw(path)?)
    }

    pub fn from_yaml(raw: Yaml) -> Result<Self> {
        let Yaml::Mapping(root) = raw else {
            return Err(Error::Config("Config root must be a mapping".into()));
        };
        let data_dir = root
            .get("data_dir")
            .and_then(Yaml::as_str)
            .ok_or_else(|| Error::Config("data_dir is required".into()))?;
        let default = root
            .get("satellite_default")
            .cloned()
            .ok_or_else(|| Error::Config("satellite_default is required".into()))?;
        let satellite_default: SatelliteConfig = serde_yaml::from_value(default.clone())
            .map_err(|e| Error::Config(format!("satellite_default: {e}")))?;
        if satellite_default.selected_bands.is_some() {
            return Err(Error::Config(
                "Selected bands should not be specified for default satellite.".into(),
            ));
        }
        let mut customs = BTreeMap::new();
        if let Some(Yaml::Mapping(blocks)) = root.get("customs") {
            for (name, _) in blocks {
                let Some(name) = name.as_str() else {
                    return Err(Error::Config("customs keys must be strings".into()));
                };
                if let Some(custom) = resolve_block(blocks, &default, name)? {
                    customs.insert(name.to_string(), custom);
                }
            }
        }
        Ok(GeefetchConfig {
            data_dir: expand_data_dir(data_dir)?,
            s1: resolve_block(&root, &default, "s1")?,
            s2: resolve_block(&root, &default, "s2")?,
            dynworld: resolve_block(&root, &default, "dynworld")?,
            landsat8: resolve_block(&root, &default, "landsat8")?,
            nasadem: resolve_block(&root, &default, "nasadem")?,
            palsar2: resolve_block(&root, &default, "palsar2")?,
            gedi: resolve_block(&root, &default, "gedi")?,
            satellite_default,
            customs,
        })
    }

    pub fn custom(&self, name: &str) -> Result<&CustomConfig> {
        self.customs.get(name).ok_or_else(|| Error::NotConfigured {
            satellite: format!("customs.{name}"),
        })
    }
}

/// Require a configured satellite block.
pub fn configured<'a, T>(block: &'a Option<T>, key: &str) -> Result<&'a T> {
    block.as_ref().ok_or_else(|| Error::NotConfigured {
        satellite: key.to_string(),
    })
}

/// Line diff of `a` against `b` in unified style, without hunk headers.
pub fn git_style_diff(a: &str, b: &str) -> String {
    let mut out = String::from("--- current\n+++ saved\n");
    for change in TextDiff::from_lines(a, b).iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => '-',
            ChangeTag::Insert => '+',
            ChangeTag::Equal => ' ',
        };
        out.push(sign);
        out.push_str(change.value());
        if change.missing_newline() {
            out.push('\n');
        }
    }
    out
}

/// Write `config` to `<dir>/config.yaml`, or check it against an existing snapshot.
pub fn save_config<T: Serialize>(config: &T, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join("config.yaml");
    let mut value = serde_yaml::to_value(config)?;
    if let Yaml::Mapping(m) = &mut value {
        m.insert(
            Yaml::from("geefetch_version"),
            Yaml::from(env!("CARGO_PKG_VERSION")),
        );
    }
    let text = serde_yaml::to_string(&value)?;
    if path.exists() {
        let saved = fs::read_to_string(&path)?;
        if saved != text {
            error!(
                "Diff current config / saved config:\n{}",
                git_style_diff(&text, &saved)
            );
            return Err(Error::ConfigMismatch);
        }
        debug!("Config matches the snapshot at {:?}, resuming.", path);
    } else {
        fs::write(&path, text)?;
        debug!("Config file is saved to {:?}.", path);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
data_dir: /tmp/geefetch-data
satellite_default:
  aoi:
    spatial:
      left: 2.2
      right: 2.5
      bottom: 48.8
      top: 48.9
    temporal:
      start_date: 2023-06-01
      end_date: 2023-07-01
    country: France
  gee:
    ee_project_id: [proj-a, proj-b]
  tile_size: 2000
  resolution: 10
  dtype: UInt16
s1:
  orbit: AS_BANDS
  speckle_filter: 2
s2:
  cloudless_portion: 60
  gee:
    max_tile_size: 4
gedi: {}
customs:
  agb:
    url: projects/sat-io/open-datasets/ESA/ESA_CCI_AGB
    pixel_range: [0, 500]
    selected_bands: [AGB]
"#;

    fn config() -> GeefetchConfig {
        GeefetchConfig::from_yaml(serde_yaml::from_str(CONFIG).unwrap()).unwrap()
    }

    #[test]
    fn test_blocks_override_default() {
        let c = config();
        let s1 = c.s1.as_ref().unwrap();
        assert_eq!(s1.orbit, S1Orbit::AsBands);
        assert_eq!(s1.speckle_filter, Some(2));
        assert_eq!(s1.base.dtype, DType::UInt16);
        assert_eq!(s1.base.tile_size, 2000.0);
        let s2 = c.s2.as_ref().unwrap();
        assert_eq!(s2.cloudless_portion, 60);
        assert_eq!(s2.cloud_prb_threshold, 40);
        // nested merge keeps the default project ids
        assert_eq!(s2.base.gee.max_tile_size, 4);
        assert_eq!(s2.base.gee.ee_project_id.to_vec(), vec!["proj-a", "proj-b"]);
        assert_eq!(c.gedi.as_ref().unwrap().format, Format::Geojson);
        assert_eq!(c.s1.as_ref().unwrap().base.aoi.spatial.tiling_crs(), None);
    }

    #[test]
    fn test_absent_block_is_not_configured() {
        let c = config();
        let err = configured(&c.landsat8, "landsat8").unwrap_err();
        assert_eq!(
            err.to_string(),
            "landsat8 is not configured. Pass `landsat8: {}` to use satellite_default."
        );
        assert!(c.custom("nope").is_err());
        let agb = c.custom("agb").unwrap();
        assert_eq!(agb.pixel_range, Some((0.0, 500.0)));
        assert_eq!(agb.base.selected_bands.as_deref(), Some(&["AGB".to_string()][..]));
    }

    #[test]
    fn test_default_selected_bands_rejected() {
        let text = CONFIG.replace("  dtype: UInt16", "  dtype: UInt16\n  selected_bands: [B2]");
        let raw = serde_yaml::from_str(&text).unwrap();
        assert!(GeefetchConfig::from_yaml(raw).is_err());
    }

    #[test]
    fn test_directory_configs_merge_in_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.yaml"), CONFIG).unwrap();
        fs::write(dir.path().join("b.yaml"), "s2:\n  cloud_prb_threshold: 25\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let c = GeefetchConfig::load(dir.path()).unwrap();
        let s2 = c.s2.unwrap();
        assert_eq!(s2.cloud_prb_threshold, 25);
        assert_eq!(s2.cloudless_portion, 60);
    }

    #[test]
    fn test_snapshot_resumes_or_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let c = config();
        let s2 = c.s2.clone().unwrap();
        save_config(&s2, dir.path()).unwrap();
        let text = fs::read_to_string(dir.path().join("config.yaml")).unwrap();
        assert!(text.contains("geefetch_version"));
        // identical config resumes
        save_config(&s2, dir.path()).unwrap();
        let mut changed = s2.clone();
        changed.cloudless_portion = 10;
        assert!(matches!(
            save_config(&changed, dir.path()),
            Err(Error::ConfigMismatch)
        ));
    }

    #[test]
    fn test_git_style_diff() {
        let diff = git_style_diff("a\nb\nc\n", "a\nx\nc\n");
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+x\n"));
        assert!(diff.contains(" a\n"));
    }

    #[test]
    fn test_relative_data_dir_is_absolute() {
        assert!(expand_data_dir("data").unwrap().is_absolute());
        assert_eq!(expand_data_dir("/srv/data").unwrap(), PathBuf::from("/srv/data"));
    }
}
