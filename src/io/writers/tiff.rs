use gdal::raster::{Buffer, GdalType, RasterBand};
use gdal::{Dataset, DriverManager, Metadata};
use ndarray::Array2;
use std::path::Path;

use crate::io::gdal::GdalError;
use crate::types::DType;

/// Shape, georeferencing and typing of a GeoTIFF to write.
#[derive(Debug, Clone)]
pub struct RasterLayout {
    pub width: usize,
    pub height: usize,
    pub geo_transform: [f64; 6],
    /// WKT; left unset when empty
    pub projection: String,
    pub band_names: Vec<String>,
    pub dtype: DType,
}

fn write_cast<T, F>(
    band: &mut RasterBand,
    offset: (usize, usize),
    data: &Array2<f64>,
    cast: F,
) -> Result<(), GdalError>
where
    T: GdalType + Copy,
    F: Fn(f64) -> T,
{
    let (rows, cols) = data.dim();
    let mut buf = Buffer::new((cols, rows), data.iter().map(|v| cast(*v)).collect());
    band.write((offset.0 as isize, offset.1 as isize), (cols, rows), &mut buf)?;
    Ok(())
}

/// GeoTIFF being filled window by window, so a large tile never sits in memory at once.
pub struct GeoTiffWriter {
    dataset: Dataset,
    layout: RasterLayout,
}

impl GeoTiffWriter {
    /// Create `output` with `layout`. Band names become band descriptions and every
    /// band gets the dtype's nodata.
    pub fn create(output: &Path, layout: &RasterLayout) -> Result<Self, GdalError> {
        let (cols, rows, count) = (layout.width, layout.height, layout.band_names.len().max(1));
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let mut dataset = match layout.dtype {
            DType::UInt8 => driver.create_with_band_type::<u8, _>(output, cols, rows, count)?,
            DType::UInt16 => driver.create_with_band_type::<u16, _>(output, cols, rows, count)?,
            DType::Float32 => driver.create_with_band_type::<f32, _>(output, cols, rows, count)?,
            DType::Float64 => driver.create_with_band_type::<f64, _>(output, cols, rows, count)?,
        };
        dataset.set_geo_transform(&layout.geo_transform)?;
        if !layout.projection.is_empty() {
            dataset.set_projection(&layout.projection)?;
        }
        let nodata = layout.dtype.nodata();
        for i in 1..=count {
            let mut band = dataset.rasterband(i)?;
            band.set_no_data_value(Some(nodata))?;
            if let Some(name) = layout.band_names.get(i - 1) {
                band.set_description(name)?;
            }
        }
        Ok(Self {
            dataset,
            layout: layout.clone(),
        })
    }

    /// Write `data` into band `index` (1-based) with its top-left pixel at `offset` (col, row).
    pub fn write_window(
        &mut self,
        index: usize,
        offset: (usize, usize),
        data: &Array2<f64>,
    ) -> Result<(), GdalError> {
        let (rows, cols) = data.dim();
        if offset.0 + cols > self.layout.width || offset.1 + rows > self.layout.height {
            return Err(GdalError::DimensionMismatch(
                self.layout.width,
                self.layout.height,
                offset.0 + cols,
                offset.1 + rows,
            ));
        }
        let mut band = self.dataset.rasterband(index)?;
        match self.layout.dtype {
            DType::UInt8 => write_cast::<u8, _>(&mut band, offset, data, |v| v as u8),
            DType::UInt16 => write_cast::<u16, _>(&mut band, offset, data, |v| v as u16),
            DType::Float32 => write_cast::<f32, _>(&mut band, offset, data, |v| v as f32),
            DType::Float64 => write_cast::<f64, _>(&mut band, offset, data, |v| v),
        }
    }
}

/// Write `bands` (each of shape `(height, width)`) as a GeoTIFF of `layout.dtype`.
pub fn write_geotiff(
    output: &Path,
    layout: &RasterLayout,
    bands: &[Array2<f64>],
) -> Result<(), GdalError> {
    let mut writer = GeoTiffWriter::create(output, layout)?;
    for (i, data) in bands.iter().enumerate() {
        if data.dim() != (layout.height, layout.width) {
            return Err(GdalError::DimensionMismatch(
                layout.width,
                layout.height,
                data.ncols(),
                data.nrows(),
            ));
        }
        writer.write_window(i + 1, (0, 0), data)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::gdal::GeoTiffReader;

    fn layout(dtype: DType) -> RasterLayout {
        RasterLayout {
            width: 3,
            height: 2,
            geo_transform: [500_000.0, 10.0, 0.0, 5_400_020.0, 0.0, -10.0],
            projection: crate::core::coords::Crs(32631).wkt().unwrap(),
            band_names: vec!["B2".into(), "B3".into()],
            dtype,
        }
    }

    #[test]
    fn test_write_float_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s2.tif");
        let b = Array2::from_elem((2, 3), 0.25);
        write_geotiff(&path, &layout(DType::Float32), &[b.clone(), b]).unwrap();
        let reader = GeoTiffReader::open(&path).unwrap();
        assert_eq!(reader.metadata.bands, 2);
        assert_eq!(reader.metadata.geotransform[0], 500_000.0);
        assert_eq!(reader.metadata.descriptions, vec!["B2", "B3"]);
        assert_eq!(reader.metadata.nodata[0], Some(f32::MIN as f64));
        assert!(reader.metadata.projection.contains("31N"));
        assert_eq!(reader.read_band(2).unwrap()[[1, 2]], 0.25);
    }

    #[test]
    fn test_windows_fill_one_tiff() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stitched.tif");
        let mut l = layout(DType::UInt16);
        l.band_names.truncate(1);
        let mut writer = GeoTiffWriter::create(&path, &l).unwrap();
        writer
            .write_window(1, (0, 0), &Array2::from_elem((2, 2), 10.0))
            .unwrap();
        writer
            .write_window(1, (2, 0), &Array2::from_elem((2, 1), 20.0))
            .unwrap();
        assert!(
            writer
                .write_window(1, (2, 0), &Array2::from_elem((2, 2), 1.0))
                .is_err()
        );
        drop(writer);
        let band = GeoTiffReader::open(&path).unwrap().read_band(1).unwrap();
        assert_eq!(band[[1, 1]], 10.0);
        assert_eq!(band[[0, 2]], 20.0);
    }

    #[test]
    fn test_shape_mismatch_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tif");
        let b = Array2::from_elem((3, 3), 1.0);
        assert!(write_geotiff(&path, &layout(DType::UInt8), &[b]).is_err());
    }
}
