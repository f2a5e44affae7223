use geo::{BoundingRect, Centroid, MultiPoint, Rect};
use geojson::{GeoJson, Value};
use serde::Serialize;

use crate::error::{NavError, Result};

pub use geojson::{Feature, FeatureCollection, JsonObject as Properties};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// Axis-aligned bounds in degrees: x is longitude, y is latitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl From<Rect<f64>> for BBox {
    fn from(r: Rect<f64>) -> Self {
        Self {
            minx: r.min().x,
            miny: r.min().y,
            maxx: r.max().x,
            maxy: r.max().y,
        }
    }
}

/// Bounds and marker point of a boundary feature.
pub trait FeatureExt {
    fn bounds(&self) -> Option<Rect<f64>>;

    /// Centre of the bounding box. Not the area centroid, but stable and
    /// cheap enough for marker placement.
    fn centroid(&self) -> Option<LatLng> {
        let c = self.bounds()?.center();
        Some(LatLng { lat: c.y, lng: c.x })
    }
}

impl FeatureExt for Feature {
    fn bounds(&self) -> Option<Rect<f64>> {
        let value = self.geometry.as_ref()?.value.clone();
        let geometry: geo::Geometry<f64> = value.try_into().ok()?;
        geometry.bounding_rect()
    }
}

pub fn feature_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Parse a boundary dataset. The document must be a feature collection whose
/// positions all carry at least a longitude and a latitude.
pub fn parse_collection(data: &[u8]) -> Result<FeatureCollection> {
    let collection = FeatureCollection::try_from(GeoJson::from_reader(data)?)?;
    for (i, feature) in collection.features.iter().enumerate() {
        if let Some(geometry) = &feature.geometry {
            if !positions_complete(&geometry.value) {
                return Err(NavError::InvalidGeometry(format!(
                    "feature {i} has a position with fewer than two coordinates"
                )));
            }
        }
    }
    Ok(collection)
}

fn positions_complete(value: &Value) -> bool {
    let ok = |p: &Vec<f64>| p.len() >= 2;
    match value {
        Value::Point(p) => ok(p),
        Value::MultiPoint(ps) | Value::LineString(ps) => ps.iter().all(ok),
        Value::MultiLineString(rings) | Value::Polygon(rings) => rings.iter().flatten().all(ok),
        Value::MultiPolygon(polys) => polys.iter().flatten().flatten().all(ok),
        Value::GeometryCollection(gs) => gs.iter().all(|g| positions_complete(&g.value)),
    }
}

/// Combined bounds of every feature that has geometry.
pub fn bounds_of<'a>(features: impl IntoIterator<Item = &'a Feature>) -> Option<BBox> {
    features
        .into_iter()
        .filter_map(FeatureExt::bounds)
        .reduce(|a, b| {
            Rect::new(
                (a.min().x.min(b.min().x), a.min().y.min(b.min().y)),
                (a.max().x.max(b.max().x), a.max().y.max(b.max().y)),
            )
        })
        .map(BBox::from)
}

/// Arithmetic mean of the given points.
pub fn mean_point(points: &[LatLng]) -> Option<LatLng> {
    let points: MultiPoint<f64> = points.iter().map(|p| (p.lng, p.lat)).collect();
    let c = points.centroid()?;
    Some(LatLng {
        lat: c.y(),
        lng: c.x(),
    })
}
