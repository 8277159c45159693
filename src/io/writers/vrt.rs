use gdal::Dataset;
use gdal::programs::raster::{BuildVRTOptions, build_vrt};
use std::path::Path;

use crate::io::gdal::GdalError;

/// Mosaic `files` into a VRT at `output`, keeping the finest resolution.
pub fn write_vrt(output: &Path, files: &[impl AsRef<Path>]) -> Result<(), GdalError> {
    let datasets = files
        .iter()
        .map(|f| Dataset::open(f.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    let options = BuildVRTOptions::new(["-resolution", "highest"])?;
    // dropping the dataset flushes the VRT to disk
    let vrt = build_vrt(Some(output), &datasets, Some(options))?;
    drop(vrt);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::writers::tiff::{RasterLayout, write_geotiff};
    use crate::types::DType;
    use ndarray::Array2;

    #[test]
    fn test_vrt_spans_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for (i, left) in [500_000.0, 500_040.0].into_iter().enumerate() {
            let path = dir.path().join(format!("t{i}.tif"));
            let layout = RasterLayout {
                width: 4,
                height: 4,
                geo_transform: [left, 10.0, 0.0, 5_400_040.0, 0.0, -10.0],
                projection: crate::core::coords::Crs(32631).wkt().unwrap(),
                band_names: vec!["elevation".into()],
                dtype: DType::Float32,
            };
            write_geotiff(&path, &layout, &[Array2::from_elem((4, 4), 12.0)]).unwrap();
            files.push(path);
        }
        let vrt = dir.path().join("nasadem_UTM31N.vrt");
        write_vrt(&vrt, &files).unwrap();
        let ds = Dataset::open(&vrt).unwrap();
        assert_eq!(ds.raster_size(), (8, 4));
    }
}
