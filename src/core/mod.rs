//! Core building blocks: coordinates and tiling, configuration, per-run download
//! parameters, country filters and post-download processing. These are internal
//! primitives consumed by the `download` and `api` modules.
pub mod config;
pub mod coords;
pub mod country;
pub mod params;
pub mod process;
pub mod tiler;
