//! Google Earth Engine access over the REST API.
//!
//! `expr` builds and serializes expression graphs, `objects` offers typed builders
//! (`Image`, `ImageCollection`, `Filter`, ...) over them, `client` sends them to
//! Earth Engine behind the mockable `EarthEngineApi` trait, and `auth` provides
//! OAuth bearer tokens.
pub mod auth;
pub mod client;
pub mod expr;
pub mod objects;

pub use auth::TokenProvider;
pub use client::{EarthEngineApi, EeError, FeaturePage, PixelGrid, PixelsRequest, RestClient};
pub use expr::{Expression, Value};
pub use objects::{FeatureCollection, Filter, Geometry, Image, ImageCollection};
