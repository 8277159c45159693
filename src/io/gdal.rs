use gdal::raster::ResampleAlg;
use gdal::{Dataset, Metadata, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::path::Path;
use thiserror::Error;

/// Errors encountered when reading or writing rasters through GDAL
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

/// Metadata extracted from a GeoTIFF chip
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection in WKT format
    pub projection: String,
    /// Nodata value of each band
    pub nodata: Vec<Option<f64>>,
    /// Band descriptions, i.e. band names
    pub descriptions: Vec<String>,
}

/// Reader for downloaded GeoTIFF chips
pub struct GeoTiffReader {
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

impl GeoTiffReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
        }
        let geotransform = match dataset.geo_transform() {
            Ok(gt) => gt,
            Err(_) => [0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        };
        let projection = dataset.projection();
        let mut nodata = Vec::with_capacity(bands);
        let mut descriptions = Vec::with_capacity(bands);
        for idx in 1..=bands {
            let band = dataset.rasterband(idx)?;
            nodata.push(band.no_data_value());
            descriptions.push(band.description().unwrap_or_default());
        }
        Ok(GeoTiffReader {
            dataset,
            metadata: GdalMetadata {
                size_x,
                size_y,
                bands,
                geotransform,
                projection,
                nodata,
                descriptions,
            },
        })
    }

    /// Read a single band (1-based index) as an f64 ndarray of shape (height, width)
    pub fn read_band(&self, index: usize) -> Result<Array2<f64>, GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<f64>(
            (0, 0),
            window,
            window,
            Some(ResampleAlg::NearestNeighbour),
        )?;
        let (height, width) = (self.metadata.size_y, self.metadata.size_x);
        Array2::from_shape_vec((height, width), buf.data().to_vec())
            .map_err(|_| GdalError::DimensionMismatch(width, height, window.0, window.1))
    }

    /// Fraction of pixels, over all bands, that are neither nodata nor NaN.
    pub fn valid_fraction(&self) -> Result<f64, GdalError> {
        let mut valid = 0usize;
        let mut total = 0usize;
        for idx in 1..=self.metadata.bands {
            let data = self.read_band(idx)?;
            let nodata = self.metadata.nodata[idx - 1];
            total += data.len();
            valid += data
                .iter()
                .filter(|v| !v.is_nan() && nodata.map_or(true, |nd| **v != nd))
                .count();
        }
        if total == 0 {
            return Ok(0.0);
        }
        Ok(valid as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::writers::tiff::{RasterLayout, write_geotiff};
    use crate::types::DType;
    use ndarray::Array2;

    #[test]
    fn test_valid_fraction_ignores_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chip.tif");
        let layout = RasterLayout {
            width: 4,
            height: 2,
            geo_transform: [650_000.0, 10.0, 0.0, 6_860_020.0, 0.0, -10.0],
            projection: String::new(),
            band_names: vec!["VV".into()],
            dtype: DType::UInt16,
        };
        let data = Array2::from_shape_vec((2, 4), vec![0.0, 1.0, 2.0, 3.0, 0.0, 0.0, 5.0, 6.0])
            .unwrap();
        write_geotiff(&path, &layout, &[data]).unwrap();
        let reader = GeoTiffReader::open(&path).unwrap();
        assert_eq!(reader.metadata.size_x, 4);
        assert_eq!(reader.metadata.descriptions, vec!["VV".to_string()]);
        assert_eq!(reader.metadata.nodata, vec![Some(0.0)]);
        assert!((reader.valid_fraction().unwrap() - 5.0 / 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_open_missing_file_fails() {
        assert!(GeoTiffReader::open("/nonexistent/chip.tif").is_err());
    }
}
