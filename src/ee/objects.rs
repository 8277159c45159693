//! Typed builders over [`Value`] for the Earth Engine algorithms geefetch uses.
//!
//! Nothing here talks to the network: each method returns a larger expression that
//! is later sent through an [`EarthEngineApi`](super::EarthEngineApi).
use std::sync::atomic::{AtomicUsize, Ordering};

use super::expr::Value;
use crate::core::coords::{Crs, GeoBoundingBox, Polygon};
use crate::error::Result;
use crate::types::ResamplingMethod;

static MAPPING_VARS: AtomicUsize = AtomicUsize::new(0);

fn mapping_var() -> String {
    format!("_MAPPING_VAR_{}_0", MAPPING_VARS.fetch_add(1, Ordering::Relaxed))
}

/// Wrap `f` as a one-argument server-side function.
fn lambda<F>(f: F) -> Value
where
    F: FnOnce(Value) -> Value,
{
    let name = mapping_var();
    let body = f(Value::ArgumentReference(name.clone()));
    Value::FunctionDefinition {
        argument_names: vec![name],
        body: Box::new(body),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry(pub Value);

impl Geometry {
    /// Planar polygon in WGS84 lon/lat.
    pub fn polygon(polygon: &Polygon) -> Geometry {
        let ring: Vec<Value> = polygon
            .ring
            .iter()
            .map(|(x, y)| Value::Array(vec![Value::from(*x), Value::from(*y)]))
            .collect();
        Geometry(Value::invoke(
            "GeometryConstructors.Polygon",
            [
                ("coordinates", Value::Array(vec![Value::Array(ring)])),
                ("geodesic", Value::from(false)),
                ("evenOdd", Value::from(true)),
            ],
        ))
    }

    /// WGS84 footprint of a bounding box.
    pub fn bbox(bbox: &GeoBoundingBox) -> Result<Geometry> {
        let wgs = bbox.transform(Crs::WGS84)?;
        Ok(Geometry::polygon(&wgs.to_polygon()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter(pub Value);

impl Filter {
    /// Acquisitions whose start time falls in `[start, end)`.
    pub fn date(start: &str, end: &str) -> Filter {
        let date = |d: &str| Value::invoke("Date", [("value", Value::from(d))]);
        let range = Value::invoke("DateRange", [("start", date(start)), ("end", date(end))]);
        Filter(Value::invoke(
            "Filter.dateRangeContains",
            [
                ("leftValue", range),
                ("rightField", Value::from("system:time_start")),
            ],
        ))
    }

    pub fn bounds(geometry: &Geometry) -> Filter {
        Filter(Value::invoke(
            "Filter.intersects",
            [
                ("leftField", Value::from(".all")),
                ("rightValue", geometry.0.clone()),
            ],
        ))
    }

    fn field_op(function: &str, field: &str, value: Value) -> Filter {
        Filter(Value::invoke(
            function,
            [("leftField", Value::from(field)), ("rightValue", value)],
        ))
    }

    pub fn eq(field: &str, value: impl Into<Value>) -> Filter {
        Self::field_op("Filter.equals", field, value.into())
    }

    pub fn eq_fields(left: &str, right: &str) -> Filter {
        Filter(Value::invoke(
            "Filter.equals",
            [
                ("leftField", Value::from(left)),
                ("rightField", Value::from(right)),
            ],
        ))
    }

    pub fn list_contains(field: &str, value: impl Into<Value>) -> Filter {
        Self::field_op("Filter.listContains", field, value.into())
    }

    /// Property `field` is one of `values`.
    pub fn in_list(field: &str, values: Value) -> Filter {
        Filter(Value::invoke(
            "Filter.listContains",
            [("leftValue", values), ("rightField", Value::from(field))],
        ))
    }

    pub fn lte(field: &str, value: impl Into<Value>) -> Filter {
        Self::field_op("Filter.lessThanOrEquals", field, value.into())
    }

    pub fn gte(field: &str, value: impl Into<Value>) -> Filter {
        Self::field_op("Filter.greaterThanOrEquals", field, value.into())
    }

    pub fn gt(field: &str, value: impl Into<Value>) -> Filter {
        Self::field_op("Filter.greaterThan", field, value.into())
    }

    pub fn lt(field: &str, value: impl Into<Value>) -> Filter {
        Self::field_op("Filter.lessThan", field, value.into())
    }

    pub fn range_contains(field: &str, min: f64, max: f64) -> Filter {
        Filter(Value::invoke(
            "Filter.rangeContains",
            [
                ("field", Value::from(field)),
                ("minValue", Value::from(min)),
                ("maxValue", Value::from(max)),
            ],
        ))
    }

    pub fn and(filters: Vec<Filter>) -> Filter {
        Filter(Value::invoke(
            "Filter.and",
            [(
                "filters",
                Value::Array(filters.into_iter().map(|f| f.0).collect()),
            )],
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Image(pub Value);

impl Image {
    pub fn load(id: &str) -> Image {
        Image(Value::invoke("Image.load", [("id", Value::from(id))]))
    }

    pub fn constant(value: f64) -> Image {
        Image(Value::invoke("Image.constant", [("value", Value::from(value))]))
    }

    fn unary(&self, function: &str) -> Image {
        Image(Value::invoke(function, [("value", self.0.clone())]))
    }

    fn binary(&self, function: &str, other: &Image) -> Image {
        Image(Value::invoke(
            function,
            [("image1", self.0.clone()), ("image2", other.0.clone())],
        ))
    }

    pub fn select<S: AsRef<str>>(&self, bands: &[S]) -> Image {
        Image(Value::invoke(
            "Image.select",
            [
                ("input", self.0.clone()),
                ("bandSelectors", Value::strings(bands)),
            ],
        ))
    }

    pub fn band(&self, band: &str) -> Image {
        self.select(&[band])
    }

    pub fn rename<S: AsRef<str>>(&self, names: &[S]) -> Image {
        Image(Value::invoke(
            "Image.rename",
            [("input", self.0.clone()), ("names", Value::strings(names))],
        ))
    }

    pub fn clip(&self, geometry: &Geometry) -> Image {
        Image(Value::invoke(
            "Image.clip",
            [("input", self.0.clone()), ("geometry", geometry.0.clone())],
        ))
    }

    pub fn clamp(&self, low: f64, high: f64) -> Image {
        Image(Value::invoke(
            "Image.clamp",
            [
                ("input", self.0.clone()),
                ("low", Value::from(low)),
                ("high", Value::from(high)),
            ],
        ))
    }

    pub fn add(&self, other: &Image) -> Image {
        self.binary("Image.add", other)
    }

    pub fn subtract(&self, other: &Image) -> Image {
        self.binary("Image.subtract", other)
    }

    pub fn multiply(&self, other: &Image) -> Image {
        self.binary("Image.multiply", other)
    }

    pub fn divide(&self, other: &Image) -> Image {
        self.binary("Image.divide", other)
    }

    pub fn pow(&self, other: &Image) -> Image {
        self.binary("Image.pow", other)
    }

    pub fn eq(&self, other: &Image) -> Image {
        self.binary("Image.eq", other)
    }

    pub fn lt(&self, other: &Image) -> Image {
        self.binary("Image.lt", other)
    }

    pub fn lte(&self, other: &Image) -> Image {
        self.binary("Image.lte", other)
    }

    pub fn gte(&self, other: &Image) -> Image {
        self.binary("Image.gte", other)
    }

    pub fn and(&self, other: &Image) -> Image {
        self.binary("Image.and", other)
    }

    pub fn or(&self, other: &Image) -> Image {
        self.binary("Image.or", other)
    }

    pub fn bitwise_and(&self, other: &Image) -> Image {
        self.binary("Image.bitwiseAnd", other)
    }

    /// `min <= self <= max`
    pub fn in_range(&self, min: f64, max: f64) -> Image {
        self.gte(&Image::constant(min))
            .and(&self.lte(&Image::constant(max)))
    }

    /// Pixel equals any of `values`.
    pub fn in_list(&self, values: &[f64]) -> Image {
        let Some((first, rest)) = values.split_first() else {
            return Image::constant(0.0);
        };
        let mut mask = self.eq(&Image::constant(*first));
        for v in rest {
            mask = mask.or(&self.eq(&Image::constant(*v)));
        }
        mask
    }

    pub fn cos(&self) -> Image {
        self.unary("Image.cos")
    }

    pub fn log10(&self) -> Image {
        self.unary("Image.log10")
    }

    pub fn to_uint8(&self) -> Image {
        self.unary("Image.toUint8")
    }

    pub fn to_uint16(&self) -> Image {
        self.unary("Image.toUint16")
    }

    pub fn to_float(&self) -> Image {
        self.unary("Image.toFloat")
    }

    pub fn update_mask(&self, mask: &Image) -> Image {
        Image(Value::invoke(
            "Image.updateMask",
            [("image", self.0.clone()), ("mask", mask.0.clone())],
        ))
    }

    /// Replace masked pixels by `value` everywhere, including outside the footprint.
    pub fn unmask(&self, value: f64) -> Image {
        Image(Value::invoke(
            "Image.unmask",
            [
                ("input", self.0.clone()),
                ("value", Value::from(value)),
                ("sameFootprint", Value::from(false)),
            ],
        ))
    }

    pub fn add_bands(&self, other: &Image) -> Image {
        Image(Value::invoke(
            "Image.addBands",
            [("dstImg", self.0.clone()), ("srcImg", other.0.clone())],
        ))
    }

    /// Replace bands of `self` that share a name with `other`.
    pub fn add_bands_overwrite(&self, other: &Image) -> Image {
        Image(Value::invoke(
            "Image.addBands",
            [
                ("dstImg", self.0.clone()),
                ("srcImg", other.0.clone()),
                ("overwrite", Value::from(true)),
            ],
        ))
    }

    /// Interpolation used when the image is reprojected. Nearest is the server default.
    pub fn resample(&self, method: ResamplingMethod) -> Image {
        if method == ResamplingMethod::Nearest {
            return self.clone();
        }
        Image(Value::invoke(
            "Image.resample",
            [
                ("image", self.0.clone()),
                ("mode", Value::from(method.to_string().as_str())),
            ],
        ))
    }

    /// Focal mean over a square kernel of `radius` pixels.
    pub fn focal_mean(&self, radius: u32) -> Image {
        let kernel = Value::invoke(
            "Kernel.square",
            [
                ("radius", Value::from(radius as f64)),
                ("units", Value::from("pixels")),
                ("normalize", Value::from(true)),
            ],
        );
        let reducer = Value::invoke("Reducer.mean", Vec::<(&str, Value)>::new());
        Image(Value::invoke(
            "Image.reduceNeighborhood",
            [
                ("image", self.0.clone()),
                ("reducer", reducer),
                ("kernel", kernel),
            ],
        ))
    }

    pub fn slope(&self) -> Image {
        Image(Value::invoke("Terrain.slope", [("input", self.0.clone())]))
    }

    /// Image stored in property `name` of this element.
    pub fn get_image(&self, name: &str) -> Image {
        Image(Value::invoke(
            "Element.get",
            [("object", self.0.clone()), ("property", Value::from(name))],
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageCollection(pub Value);

impl ImageCollection {
    pub fn load(id: &str) -> ImageCollection {
        ImageCollection(Value::invoke("ImageCollection.load", [("id", Value::from(id))]))
    }

    pub fn filter(&self, filter: Filter) -> ImageCollection {
        ImageCollection(Value::invoke(
            "Collection.filter",
            [("collection", self.0.clone()), ("filter", filter.0)],
        ))
    }

    pub fn filter_date(&self, start: &str, end: &str) -> ImageCollection {
        self.filter(Filter::date(start, end))
    }

    pub fn filter_bounds(&self, geometry: &Geometry) -> ImageCollection {
        self.filter(Filter::bounds(geometry))
    }

    pub fn map<F>(&self, f: F) -> ImageCollection
    where
        F: FnOnce(Image) -> Image,
    {
        let function = lambda(|arg| f(Image(arg)).0);
        ImageCollection(Value::invoke(
            "Collection.map",
            [("collection", self.0.clone()), ("baseAlgorithm", function)],
        ))
    }

    pub fn select<S: AsRef<str>>(&self, bands: &[S]) -> ImageCollection {
        let bands: Vec<String> = bands.iter().map(|b| b.as_ref().to_string()).collect();
        self.map(move |im| im.select(&bands))
    }

    pub fn mean(&self) -> Image {
        Image(Value::invoke("reduce.mean", [("collection", self.0.clone())]))
    }

    pub fn median(&self) -> Image {
        Image(Value::invoke("reduce.median", [("collection", self.0.clone())]))
    }

    pub fn mosaic(&self) -> Image {
        Image(Value::invoke(
            "ImageCollection.mosaic",
            [("collection", self.0.clone())],
        ))
    }

    pub fn first(&self) -> Image {
        Image(Value::invoke("Collection.first", [("collection", self.0.clone())]))
    }

    pub fn size(&self) -> Value {
        Value::invoke("Collection.size", [("collection", self.0.clone())])
    }

    pub fn aggregate_array(&self, property: &str) -> Value {
        Value::invoke(
            "AggregateFeatureCollection.array",
            [
                ("collection", self.0.clone()),
                ("property", Value::from(property)),
            ],
        )
    }

    /// Attach to each image of `self` the first match of `secondary` on `system:index`,
    /// stored under property `key`.
    pub fn join_first_on_index(&self, secondary: &ImageCollection, key: &str) -> ImageCollection {
        let join = Value::invoke("Join.saveFirst", [("matchKey", Value::from(key))]);
        ImageCollection(Value::invoke(
            "Join.apply",
            [
                ("join", join),
                ("primary", self.0.clone()),
                ("secondary", secondary.0.clone()),
                (
                    "condition",
                    Filter::eq_fields("system:index", "system:index").0,
                ),
            ],
        ))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection(pub Value);

impl FeatureCollection {
    pub fn load(table_id: &str) -> FeatureCollection {
        FeatureCollection(Value::invoke(
            "Collection.loadTable",
            [("tableId", Value::from(table_id))],
        ))
    }

    /// Collection of collections, to be flattened.
    pub fn of(collections: Vec<FeatureCollection>) -> FeatureCollection {
        FeatureCollection(Value::invoke(
            "Collection",
            [(
                "features",
                Value::Array(collections.into_iter().map(|c| c.0).collect()),
            )],
        ))
    }

    pub fn flatten(&self) -> FeatureCollection {
        FeatureCollection(Value::invoke(
            "Collection.flatten",
            [("collection", self.0.clone())],
        ))
    }

    pub fn filter(&self, filter: Filter) -> FeatureCollection {
        FeatureCollection(Value::invoke(
            "Collection.filter",
            [("collection", self.0.clone()), ("filter", filter.0)],
        ))
    }

    pub fn filter_bounds(&self, geometry: &Geometry) -> FeatureCollection {
        self.filter(Filter::bounds(geometry))
    }

    /// Keep only `properties` on each feature, with its geometry.
    pub fn select<S: AsRef<str>>(&self, properties: &[S]) -> FeatureCollection {
        let selectors = Value::strings(properties);
        let function = lambda(|arg| {
            Value::invoke(
                "Feature.select",
                [
                    ("input", arg),
                    ("propertySelectors", selectors),
                    ("retainGeometry", Value::from(true)),
                ],
            )
        });
        FeatureCollection(Value::invoke(
            "Collection.map",
            [("collection", self.0.clone()), ("baseAlgorithm", function)],
        ))
    }

    pub fn aggregate_array(&self, property: &str) -> Value {
        Value::invoke(
            "AggregateFeatureCollection.array",
            [
                ("collection", self.0.clone()),
                ("property", Value::from(property)),
            ],
        )
    }
}
