//! Per-dataset recipes: which Earth Engine collection to query, how to filter and
//! mask it, how to composite it and how to scale it to the requested dtype.
//!
//! Every source implements [`Satellite`]. Recipes only build expressions; the few
//! metadata queries they need (collection sizes, image ids) go through the
//! [`EarthEngineApi`] handed to them.
use chrono::NaiveDate;
use tracing::debug;

use crate::core::coords::{Crs, GeoBoundingBox};
use crate::ee::{
    EarthEngineApi, Expression, FeatureCollection, Filter, Geometry, Image, ImageCollection, Value,
};
use crate::error::{Error, Result};
use crate::types::{CompositeMethod, DType};

pub mod custom;
pub mod dynworld;
pub mod gedi;
pub mod landsat8;
pub mod nasadem;
pub mod palsar2;
pub mod s1;
pub mod s2;

pub use custom::CustomSatellite;
pub use dynworld::DynWorld;
pub use gedi::{GediRaster, GediVector};
pub use landsat8::Landsat8;
pub use nasadem::Nasadem;
pub use palsar2::Palsar2;
pub use s1::S1;
pub use s2::S2;

/// Collections are searched in the AOI grown by this many metres.
pub const SEARCH_BUFFER_M: f64 = 10_000.0;

/// What to fetch for one tile.
#[derive(Debug, Clone)]
pub struct TileQuery {
    pub aoi: GeoBoundingBox,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub composite_method: CompositeMethod,
    pub dtype: DType,
    pub selected_bands: Vec<String>,
}

impl TileQuery {
    /// Start and end dates as `YYYY-MM-DD`, required by temporal sources.
    pub fn dates(&self, satellite: &str) -> Result<(String, String)> {
        match (self.start_date, self.end_date) {
            (Some(s), Some(e)) => Ok((
                s.format("%Y-%m-%d").to_string(),
                e.format("%Y-%m-%d").to_string(),
            )),
            _ => Err(Error::Config(format!(
                "{satellite} requires aoi.temporal.start_date and aoi.temporal.end_date"
            ))),
        }
    }

    pub fn wgs84(&self) -> Result<GeoBoundingBox> {
        self.aoi.transform(Crs::WGS84)
    }

    /// Footprint used to clip composites.
    pub fn region(&self) -> Result<Geometry> {
        Geometry::bbox(&self.aoi)
    }

    /// Footprint used to search collections, buffered by [`SEARCH_BUFFER_M`].
    pub fn search_region(&self) -> Result<Geometry> {
        let buffered = if self.aoi.crs.is_metric() {
            self.aoi.buffer(SEARCH_BUFFER_M)
        } else {
            // roughly 10 km in degrees
            self.aoi.buffer(0.1)
        };
        Geometry::bbox(&buffered)
    }
}

/// Server-side object a tile is downloaded from.
#[derive(Debug, Clone)]
pub enum Downloadable {
    Image(Image),
    Features(FeatureCollection),
}

pub trait Satellite: Send + Sync {
    /// Short name, used for directories and filenames.
    fn name(&self) -> &str;

    fn full_name(&self) -> &str;

    fn bands(&self) -> Vec<String>;

    fn default_selected_bands(&self) -> Vec<String>;

    /// Valid pixel range of `band` before scaling.
    fn pixel_range(&self, band: &str) -> (f64, f64);

    /// Native resolution in metres.
    fn resolution(&self) -> f64;

    fn is_raster(&self) -> bool {
        true
    }

    /// Whether a mostly empty tile should count as a failed download.
    fn check_clean(&self) -> bool {
        true
    }

    /// Number of chips downloaded concurrently.
    fn max_workers(&self) -> usize {
        3
    }

    fn check_selected_bands(&self, bands: &[String]) -> Result<()> {
        let valid = self.bands();
        for band in bands {
            if !valid.contains(band) {
                return Err(Error::InvalidBand {
                    band: band.clone(),
                    satellite: self.full_name().to_string(),
                    valid: valid.join(", "),
                });
            }
        }
        Ok(())
    }

    /// Composite for one tile.
    fn get(&self, api: &dyn EarthEngineApi, query: &TileQuery) -> Result<Downloadable>;

    /// Individual acquisitions for one tile, keyed by image id.
    fn get_time_series(
        &self,
        _api: &dyn EarthEngineApi,
        _query: &TileQuery,
    ) -> Result<Vec<(String, Image)>> {
        Err(Error::Unsupported(format!(
            "Time series is not supported for {}.",
            self.full_name()
        )))
    }
}

/// Reduce a collection with the configured composite method.
pub fn composite(method: CompositeMethod, collection: &ImageCollection) -> Result<Image> {
    match method {
        CompositeMethod::Mean => Ok(collection.mean()),
        CompositeMethod::Median => Ok(collection.median()),
        CompositeMethod::Mosaic => Ok(collection.mosaic()),
        CompositeMethod::Medoid => Err(Error::Unsupported(
            "MEDOID composite is not supported".to_string(),
        )),
        CompositeMethod::TimeSeries => Err(Error::Unsupported(
            "TIME_SERIES is not a composite; download a time series instead".to_string(),
        )),
    }
}

fn scale_to(image: &Image, min: f64, max: f64, dtype: DType) -> Image {
    let clamped = image.clamp(min, max);
    match dtype {
        DType::UInt16 => clamped
            .subtract(&Image::constant(min))
            .multiply(&Image::constant(65535.0 / (max - min))),
        DType::UInt8 => clamped
            .subtract(&Image::constant(min))
            .multiply(&Image::constant(255.0 / (max - min))),
        DType::Float32 | DType::Float64 => clamped,
    }
}

fn cast(image: &Image, dtype: DType) -> Image {
    match dtype {
        DType::UInt16 => image.to_uint16(),
        DType::UInt8 => image.to_uint8(),
        DType::Float32 | DType::Float64 => image.to_float(),
    }
}

/// Clamp `bands` of `image` to their pixel range and rescale them to `dtype`.
///
/// Bands sharing one range are scaled together; otherwise band by band.
pub fn convert_image<S: Satellite + ?Sized>(
    satellite: &S,
    image: &Image,
    bands: &[String],
    dtype: DType,
) -> Result<Image> {
    dtype.ensure_supported()?;
    let Some(first) = bands.first() else {
        return Err(Error::Config(format!(
            "No band selected for {}",
            satellite.full_name()
        )));
    };
    let range = satellite.pixel_range(first);
    let shared = bands.iter().all(|b| satellite.pixel_range(b) == range);
    let scaled = if shared {
        scale_to(&image.select(bands), range.0, range.1, dtype)
    } else {
        let mut out: Option<Image> = None;
        for band in bands {
            let (min, max) = satellite.pixel_range(band);
            let b = cast(&scale_to(&image.band(band), min, max, dtype), dtype);
            out = Some(match out {
                None => b,
                Some(acc) => acc.add_bands(&b),
            });
        }
        // every band is already scaled; the outer cast only unifies types
        out.unwrap_or_else(|| image.select(bands))
    };
    Ok(cast(&scaled, dtype))
}

/// Number of images in a collection.
pub fn collection_size(api: &dyn EarthEngineApi, collection: &ImageCollection) -> Result<u64> {
    let value = api.compute_value(&Expression::new(&collection.size()))?;
    value
        .as_u64()
        .or_else(|| value.as_f64().map(|v| v as u64))
        .ok_or_else(|| Error::external(format!("Unexpected collection size {value}")))
}

/// Split a collection into its images, keyed by `system:index`.
pub fn split_collection(
    api: &dyn EarthEngineApi,
    collection: &ImageCollection,
) -> Result<Vec<(String, Image)>> {
    let value = api.compute_value(&Expression::new(
        &collection.aggregate_array("system:index"),
    ))?;
    let ids: Vec<String> = value
        .as_array()
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    debug!("Collection holds {} images", ids.len());
    Ok(ids
        .into_iter()
        .map(|id| {
            let image = collection
                .filter(Filter::eq("system:index", Value::from(id.as_str())))
                .first();
            (id, image)
        })
        .collect())
}

/// Resolve the bands to download: explicit selection or the source defaults.
pub fn resolve_bands<S: Satellite + ?Sized>(
    satellite: &S,
    selected: Option<&[String]>,
) -> Result<Vec<String>> {
    let bands = match selected {
        Some(b) if !b.is_empty() => b.to_vec(),
        _ => satellite.default_selected_bands(),
    };
    satellite.check_selected_bands(&bands)?;
    Ok(bands)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub fn paris_query(method: CompositeMethod, dtype: DType, bands: &[&str]) -> TileQuery {
        TileQuery {
            aoi: GeoBoundingBox::new(
                650_000.0,
                6_860_000.0,
                655_000.0,
                6_865_000.0,
                Crs(2154),
            )
            .unwrap(),
            start_date: NaiveDate::from_ymd_opt(2023, 6, 1),
            end_date: NaiveDate::from_ymd_opt(2023, 7, 1),
            composite_method: method,
            dtype,
            selected_bands: bands.iter().map(|b| b.to_string()).collect(),
        }
    }

    /// Every function name used anywhere in the expression.
    pub fn function_names(image: &Image) -> Vec<String> {
        let expr = Expression::new(&image.0);
        let text = serde_json::to_string(&expr).unwrap();
        let re = regex::Regex::new(r#""functionName":"([^"]+)""#).unwrap();
        re.captures_iter(&text).map(|c| c[1].to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_medoid_is_rejected() {
        let col = ImageCollection::load("x");
        assert!(composite(CompositeMethod::Medoid, &col).is_err());
        assert!(composite(CompositeMethod::Median, &col).is_ok());
    }

    #[test]
    fn test_convert_uint16_scales_range() {
        let sat = DynWorld;
        let im = Image::load("x");
        let bands = vec!["water".to_string()];
        let out = convert_image(&sat, &im, &bands, DType::UInt16).unwrap();
        let expr = Expression::new(&out.0);
        assert_eq!(
            expr.values[&expr.result]["functionInvocationValue"]["functionName"],
            "Image.toUint16"
        );
        let names = function_names(&out);
        assert!(names.contains(&"Image.clamp".to_string()));
        assert!(names.contains(&"Image.multiply".to_string()));
        assert!(convert_image(&sat, &im, &bands, DType::Float64).is_err());
    }

    #[test]
    fn test_query_requires_dates() {
        let mut q = paris_query(CompositeMethod::Median, DType::Float32, &["VV"]);
        assert_eq!(
            q.dates("s1").unwrap(),
            ("2023-06-01".to_string(), "2023-07-01".to_string())
        );
        q.start_date = None;
        assert!(q.dates("s1").is_err());
    }
}
