//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, GDAL, Earth Engine and serialization errors, and provides
//! semantic variants for configuration, band validation and download failures.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("Earth Engine error: {0}")]
    EarthEngine(#[from] crate::ee::EeError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{satellite} is not configured. Pass `{satellite}: {{}}` to use satellite_default.")]
    NotConfigured { satellite: String },

    #[error("Band {band} is not a valid band for {satellite}. Valid bands are {valid}")]
    InvalidBand {
        band: String,
        satellite: String,
        valid: String,
    },

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Collection of 0 {satellite} image. Check region {region}.")]
    EmptyCollection { satellite: String, region: String },

    #[error("Downloaded data at {path} is empty or corrupted")]
    BadData { path: String },

    #[error("Download of {path} failed after {attempts} attempts: {reason}")]
    Download {
        path: String,
        attempts: usize,
        reason: String,
    },

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Current config and saved config disagree. Aborting.")]
    ConfigMismatch,

    #[error("Unknown country {name:?}. Did you mean {suggestion:?}?")]
    UnknownCountry { name: String, suggestion: String },

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }

    /// True when the failure came from Earth Engine refusing an oversized request.
    pub fn is_too_large(&self) -> bool {
        matches!(self, Error::EarthEngine(e) if e.is_too_large())
    }
}
