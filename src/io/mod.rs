//! I/O layer for downloaded chips.
//! Provides the `gdal` GeoTIFF reader and `writers` for GeoTIFF tiles, VRT mosaics
//! and GeoJSON/CSV vector outputs.
pub mod gdal;
pub use gdal::{GdalError, GdalMetadata, GeoTiffReader};

pub mod writers;
