//! Coordinate reference systems, UTM cells and georeferenced bounding boxes.
//!
//! Reprojection goes through GDAL/PROJ with traditional GIS axis order, so WGS84
//! coordinates are always `(lon, lat)`.
use std::collections::BTreeSet;

use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};
use gdal::vector::{Geometry, OGRwkbGeometryType};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::io::GdalError;

const EPS: f64 = 1e-10;

/// Letters of the UTM latitude bands, south to north.
const UTM_LETTERS: &[char] = &[
    'C', 'D', 'E', 'F', 'G', 'H', 'J', 'K', 'L', 'M', 'N', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W',
    'X',
];

/// A coordinate reference system identified by its EPSG code.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Crs(pub u32);

impl Crs {
    pub const WGS84: Crs = Crs(4326);

    pub fn epsg(&self) -> u32 {
        self.0
    }

    pub fn is_utm(&self) -> bool {
        (32600 < self.0 && self.0 <= 32660) || (32700 < self.0 && self.0 <= 32760)
    }

    /// `UTM31N` style name for UTM codes, `EPSG2154` otherwise.
    pub fn name(&self) -> String {
        if self.is_utm() {
            let zone = self.0 % 100;
            let hemisphere = if self.0 < 32700 { 'N' } else { 'S' };
            format!("UTM{}{}", zone, hemisphere)
        } else {
            format!("EPSG{}", self.0)
        }
    }

    /// Inverse of [`Crs::name`].
    pub fn from_name(name: &str) -> Option<Crs> {
        if let Some(rest) = name.strip_prefix("UTM") {
            let (zone, hemisphere) = rest.split_at(rest.len().checked_sub(1)?);
            let zone: u32 = zone.parse().ok()?;
            if !(1..=60).contains(&zone) {
                return None;
            }
            return match hemisphere {
                "N" => Some(Crs(32600 + zone)),
                "S" => Some(Crs(32700 + zone)),
                _ => None,
            };
        }
        name.strip_prefix("EPSG")?.parse().ok().map(Crs)
    }

    /// Code as understood by Earth Engine, e.g. `EPSG:32631`.
    pub fn code(&self) -> String {
        format!("EPSG:{}", self.0)
    }

    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        let mut srs = SpatialRef::from_epsg(self.0).map_err(GdalError::from)?;
        srs.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);
        Ok(srs)
    }

    /// Projected CRS whose linear unit is the metre.
    pub fn is_metric(&self) -> bool {
        if self.is_utm() {
            return true;
        }
        match self.spatial_ref() {
            Ok(srs) => srs.is_projected() && (srs.linear_units() - 1.0).abs() < 1e-9,
            Err(_) => false,
        }
    }

    pub fn wkt(&self) -> Result<String> {
        let srs = self.spatial_ref()?;
        Ok(srs.to_wkt().map_err(GdalError::from)?)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Transform coordinates in place from one CRS to another.
pub fn transform_coords(from: Crs, to: Crs, xs: &mut [f64], ys: &mut [f64]) -> Result<()> {
    if from == to {
        return Ok(());
    }
    let src = from.spatial_ref()?;
    let dst = to.spatial_ref()?;
    let transform = CoordTransform::new(&src, &dst).map_err(GdalError::from)?;
    let mut zs = vec![0.0; xs.len()];
    transform
        .transform_coords(xs, ys, &mut zs)
        .map_err(GdalError::from)?;
    Ok(())
}

/// A UTM grid cell: a 6° zone and an 8° latitude band.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Utm {
    pub zone: u8,
    pub letter: char,
}

impl Utm {
    pub fn new(zone: u8, letter: char) -> Result<Self> {
        if !(1..=60).contains(&zone) {
            return Err(Error::InvalidArgument {
                arg: "utm zone",
                value: zone.to_string(),
            });
        }
        if !UTM_LETTERS.contains(&letter) {
            return Err(Error::InvalidArgument {
                arg: "utm letter",
                value: letter.to_string(),
            });
        }
        Ok(Self { zone, letter })
    }

    pub fn from_lonlat(lon: f64, lat: f64) -> Self {
        let zone = ((lon / 6.0).floor() as i64 + 31).clamp(1, 60) as u8;
        let idx = ((lat + 80.0) / 8.0).floor() as i64;
        let idx = idx.clamp(0, UTM_LETTERS.len() as i64 - 1) as usize;
        Self {
            zone,
            letter: UTM_LETTERS[idx],
        }
    }

    pub fn is_north(&self) -> bool {
        self.letter >= 'N'
    }

    pub fn crs(&self) -> Crs {
        if self.is_north() {
            Crs(32600 + self.zone as u32)
        } else {
            Crs(32700 + self.zone as u32)
        }
    }

    fn letter_index(&self) -> usize {
        UTM_LETTERS
            .iter()
            .position(|l| *l == self.letter)
            .unwrap_or_default()
    }

    /// WGS84 extent of the cell.
    pub fn bbox(&self) -> GeoBoundingBox {
        let left = (self.zone as f64 - 31.0) * 6.0;
        let bottom = -80.0 + 8.0 * self.letter_index() as f64;
        let top = if self.letter == 'X' { 84.0 } else { bottom + 8.0 };
        GeoBoundingBox {
            left,
            bottom,
            right: left + 6.0,
            top,
            crs: Crs::WGS84,
        }
    }
}

impl std::fmt::Display for Utm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.zone, self.letter)
    }
}

/// An axis-aligned bounding box in a given CRS.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct GeoBoundingBox {
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub top: f64,
    pub crs: Crs,
}

impl GeoBoundingBox {
    pub fn new(left: f64, bottom: f64, right: f64, top: f64, crs: Crs) -> Result<Self> {
        if left > right || bottom > top {
            return Err(Error::InvalidArgument {
                arg: "bounding box",
                value: format!("left={left} bottom={bottom} right={right} top={top}"),
            });
        }
        Ok(Self {
            left,
            bottom,
            right,
            top,
            crs,
        })
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.top - self.bottom
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn is_empty(&self) -> bool {
        self.area() < EPS
    }

    /// Overlap of two boxes in the same CRS, `None` when they are disjoint.
    pub fn intersection(&self, other: &GeoBoundingBox) -> Option<GeoBoundingBox> {
        let left = self.left.max(other.left);
        let right = self.right.min(other.right);
        let bottom = self.bottom.max(other.bottom);
        let top = self.top.min(other.top);
        if left > right || bottom > top {
            return None;
        }
        Some(GeoBoundingBox {
            left,
            bottom,
            right,
            top,
            crs: self.crs,
        })
    }

    pub fn intersects(&self, other: &GeoBoundingBox) -> bool {
        self.intersection(other).is_some_and(|b| !b.is_empty())
    }

    pub fn buffer(&self, distance: f64) -> GeoBoundingBox {
        GeoBoundingBox {
            left: self.left - distance,
            bottom: self.bottom - distance,
            right: self.right + distance,
            top: self.top + distance,
            crs: self.crs,
        }
    }

    pub fn with_crs(&self, crs: Crs) -> GeoBoundingBox {
        GeoBoundingBox { crs, ..*self }
    }

    /// Corners in counter-clockwise order starting at the lower left.
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.left, self.bottom),
            (self.right, self.bottom),
            (self.right, self.top),
            (self.left, self.top),
        ]
    }

    /// Envelope of the four reprojected corners.
    pub fn transform(&self, crs: Crs) -> Result<GeoBoundingBox> {
        if crs == self.crs {
            return Ok(*self);
        }
        let corners = self.corners();
        let mut xs: Vec<f64> = corners.iter().map(|c| c.0).collect();
        let mut ys: Vec<f64> = corners.iter().map(|c| c.1).collect();
        transform_coords(self.crs, crs, &mut xs, &mut ys)?;
        let fold_min = |v: &[f64]| v.iter().cloned().fold(f64::INFINITY, f64::min);
        let fold_max = |v: &[f64]| v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        GeoBoundingBox::new(fold_min(&xs), fold_min(&ys), fold_max(&xs), fold_max(&ys), crs)
    }

    /// UTM cells touched by the box.
    pub fn to_utms(&self) -> Result<BTreeSet<Utm>> {
        let wgs = self.transform(Crs::WGS84)?;
        let lo = Utm::from_lonlat(wgs.left, wgs.bottom);
        let hi = Utm::from_lonlat(wgs.right, wgs.top);
        let mut out = BTreeSet::new();
        for zone in lo.zone..=hi.zone {
            for idx in lo.letter_index()..=hi.letter_index() {
                out.insert(Utm {
                    zone,
                    letter: UTM_LETTERS[idx],
                });
            }
        }
        Ok(out)
    }

    pub fn to_polygon(&self) -> Polygon {
        let mut ring: Vec<(f64, f64)> = self.corners().to_vec();
        ring.push((self.left, self.bottom));
        Polygon { ring }
    }
}

impl std::fmt::Display for GeoBoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoBoundingBox(left={}, bottom={}, right={}, top={}, crs={})",
            self.left, self.bottom, self.right, self.top, self.crs
        )
    }
}

/// A simple closed ring, used for country footprints in WGS84.
///
/// Geometric predicates go through OGR; the ring itself stays plain data so it
/// can be shared across download threads.
#[derive(Clone, PartialEq, Debug)]
pub struct Polygon {
    pub ring: Vec<(f64, f64)>,
}

impl Polygon {
    pub fn new(mut ring: Vec<(f64, f64)>) -> Self {
        if ring.first() != ring.last() {
            if let Some(first) = ring.first().copied() {
                ring.push(first);
            }
        }
        Self { ring }
    }

    pub fn to_geometry(&self) -> Result<Geometry> {
        let mut ring =
            Geometry::empty(OGRwkbGeometryType::wkbLinearRing).map_err(GdalError::from)?;
        for point in &self.ring {
            ring.add_point_2d(*point);
        }
        let mut polygon =
            Geometry::empty(OGRwkbGeometryType::wkbPolygon).map_err(GdalError::from)?;
        polygon.add_geometry(ring).map_err(GdalError::from)?;
        Ok(polygon)
    }

    /// Area in squared CRS units.
    pub fn area(&self) -> Result<f64> {
        Ok(self.to_geometry()?.area())
    }

    pub fn contains_point(&self, x: f64, y: f64) -> Result<bool> {
        let mut point =
            Geometry::empty(OGRwkbGeometryType::wkbPoint).map_err(GdalError::from)?;
        point.add_point_2d((x, y));
        Ok(self.to_geometry()?.contains(&point))
    }

    /// Shared boundaries count as intersecting.
    pub fn intersects_bbox(&self, bbox: &GeoBoundingBox) -> Result<bool> {
        let rect = bbox.to_polygon().to_geometry()?;
        Ok(self.to_geometry()?.intersects(&rect))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utm_crs_names() {
        assert!(Crs(32631).is_utm());
        assert!(Crs(32760).is_utm());
        assert!(!Crs(32600).is_utm());
        assert!(!Crs(2154).is_utm());
        assert_eq!(Crs(32631).name(), "UTM31N");
        assert_eq!(Crs(32733).name(), "UTM33S");
        assert_eq!(Crs(2154).name(), "EPSG2154");
        assert_eq!(Crs::from_name("UTM31N"), Some(Crs(32631)));
        assert_eq!(Crs::from_name("UTM33S"), Some(Crs(32733)));
        assert_eq!(Crs::from_name("EPSG2154"), Some(Crs(2154)));
        assert_eq!(Crs::from_name("UTM61N"), None);
        assert_eq!(Crs::from_name("LAMB93"), None);
    }

    #[test]
    fn test_utm_from_lonlat() {
        // Paris
        let utm = Utm::from_lonlat(2.35, 48.85);
        assert_eq!(utm.zone, 31);
        assert_eq!(utm.letter, 'U');
        assert_eq!(utm.crs(), Crs(32631));
        // Southern hemisphere
        let utm = Utm::from_lonlat(18.4, -33.9);
        assert_eq!(utm.crs(), Crs(32734));
    }

    #[test]
    fn test_utm_bbox() {
        let b = Utm::new(31, 'U').unwrap().bbox();
        assert_eq!((b.left, b.bottom, b.right, b.top), (0.0, 48.0, 6.0, 56.0));
        let x = Utm::new(31, 'X').unwrap().bbox();
        assert_eq!(x.top, 84.0);
        assert!(Utm::new(0, 'U').is_err());
        assert!(Utm::new(31, 'I').is_err());
    }

    #[test]
    fn test_bbox_validation_and_ops() {
        assert!(GeoBoundingBox::new(1.0, 0.0, 0.0, 1.0, Crs::WGS84).is_err());
        let a = GeoBoundingBox::new(0.0, 0.0, 2.0, 2.0, Crs::WGS84).unwrap();
        let b = GeoBoundingBox::new(1.0, 1.0, 3.0, 3.0, Crs::WGS84).unwrap();
        let i = a.intersection(&b).unwrap();
        assert_eq!((i.left, i.bottom, i.right, i.top), (1.0, 1.0, 2.0, 2.0));
        assert!(a.intersects(&b));
        // Touching edges have an empty intersection
        let c = GeoBoundingBox::new(2.0, 0.0, 3.0, 2.0, Crs::WGS84).unwrap();
        assert!(!a.intersects(&c));
        assert_eq!(a.buffer(1.0).area(), 16.0);
    }

    #[test]
    fn test_identity_transform() {
        let a = GeoBoundingBox::new(0.0, 0.0, 2.0, 2.0, Crs(2154)).unwrap();
        assert_eq!(a.transform(Crs(2154)).unwrap(), a);
    }

    #[test]
    fn test_polygon_intersections() {
        let tri = Polygon::new(vec![(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        assert_eq!(tri.area().unwrap(), 50.0);
        assert!(tri.contains_point(1.0, 1.0).unwrap());
        assert!(!tri.contains_point(8.0, 8.0).unwrap());
        let inside = GeoBoundingBox::new(1.0, 1.0, 2.0, 2.0, Crs::WGS84).unwrap();
        let outside = GeoBoundingBox::new(8.0, 8.0, 9.0, 9.0, Crs::WGS84).unwrap();
        let around = GeoBoundingBox::new(-1.0, -1.0, 20.0, 20.0, Crs::WGS84).unwrap();
        assert!(tri.intersects_bbox(&inside).unwrap());
        assert!(!tri.intersects_bbox(&outside).unwrap());
        assert!(tri.intersects_bbox(&around).unwrap());
    }

    #[test]
    fn test_polygon_touching_bbox_intersects() {
        let rect = Polygon::new(vec![(0.0, 0.0), (2.0, 0.0), (2.0, 1.0), (0.0, 1.0)]);
        let neighbour = GeoBoundingBox::new(2.0, 0.0, 3.0, 1.0, Crs::WGS84).unwrap();
        assert!(rect.intersects_bbox(&neighbour).unwrap());
        let apart = GeoBoundingBox::new(2.5, 0.0, 3.0, 1.0, Crs::WGS84).unwrap();
        assert!(!rect.intersects_bbox(&apart).unwrap());
    }
}
