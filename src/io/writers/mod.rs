//! Output writers: GeoTIFF tiles, VRT mosaics and vector tables.
pub mod tiff;
pub mod vector;
pub mod vrt;

pub use tiff::{RasterLayout, write_geotiff};
pub use vrt::write_vrt;
