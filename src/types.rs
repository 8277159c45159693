//! Shared types and enums used across geefetch.
//! Includes `DType`, `CompositeMethod`, vector `Format`, orbit selectors (`S1Orbit`,
//! `P2Orbit`) and `ResamplingMethod`. YAML spellings follow the serde renames.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum DType {
    UInt8,
    UInt16,
    Float32,
    Float64,
}

impl DType {
    pub fn size_in_bytes(&self) -> usize {
        match self {
            DType::UInt8 => 1,
            DType::UInt16 => 2,
            DType::Float32 => 4,
            DType::Float64 => 8,
        }
    }

    /// Value written where Earth Engine has no data.
    pub fn nodata(&self) -> f64 {
        match self {
            DType::UInt8 | DType::UInt16 => 0.0,
            DType::Float32 | DType::Float64 => f32::MIN as f64,
        }
    }

    /// Earth Engine cannot export 64-bit floats.
    pub fn ensure_supported(&self) -> Result<()> {
        match self {
            DType::Float64 => Err(Error::Unsupported(
                "Float64 is not supported by Google Earth Engine".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DType::UInt8 => "UInt8",
            DType::UInt16 => "UInt16",
            DType::Float32 => "Float32",
            DType::Float64 => "Float64",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompositeMethod {
    Mean,
    Median,
    Medoid,
    Mosaic,
    TimeSeries,
}

impl CompositeMethod {
    pub fn is_time_series(&self) -> bool {
        matches!(self, CompositeMethod::TimeSeries)
    }
}

impl std::fmt::Display for CompositeMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompositeMethod::Mean => write!(f, "MEAN"),
            CompositeMethod::Median => write!(f, "MEDIAN"),
            CompositeMethod::Medoid => write!(f, "MEDOID"),
            CompositeMethod::Mosaic => write!(f, "MOSAIC"),
            CompositeMethod::TimeSeries => write!(f, "TIME_SERIES"),
        }
    }
}

/// Output format for vector sources.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Geojson,
    Csv,
}

impl Format {
    pub fn extension(&self) -> &'static str {
        match self {
            Format::Geojson => "geojson",
            Format::Csv => "csv",
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.extension())
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum S1Orbit {
    Ascending,
    Descending,
    AsBands,
    Both,
}

impl std::fmt::Display for S1Orbit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            S1Orbit::Ascending => write!(f, "ASCENDING"),
            S1Orbit::Descending => write!(f, "DESCENDING"),
            S1Orbit::AsBands => write!(f, "AS_BANDS"),
            S1Orbit::Both => write!(f, "BOTH"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum P2Orbit {
    Ascending,
    Descending,
}

impl P2Orbit {
    /// Value of the `PassDirection` property in the PALSAR-2 catalog.
    pub fn pass_direction(&self) -> &'static str {
        match self {
            P2Orbit::Ascending => "Ascending",
            P2Orbit::Descending => "Descending",
        }
    }
}

impl std::fmt::Display for P2Orbit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            P2Orbit::Ascending => write!(f, "ASCENDING"),
            P2Orbit::Descending => write!(f, "DESCENDING"),
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResamplingMethod {
    Nearest,
    Bilinear,
    Bicubic,
}

impl std::fmt::Display for ResamplingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResamplingMethod::Nearest => write!(f, "nearest"),
            ResamplingMethod::Bilinear => write!(f, "bilinear"),
            ResamplingMethod::Bicubic => write!(f, "bicubic"),
        }
    }
}
