use crate::geofence::{GeoPoint, Geofence};
use geo::{Contains, LineString, Polygon};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PolygonParams {
    vertices: Vec<GeoPoint>,
}

/// Ring of vertices tested in the lat/lon plane; the ring closes itself.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "PolygonParams")]
pub struct PolygonGeofence {
    polygon: Polygon<f64>,
}

impl From<PolygonParams> for PolygonGeofence {
    fn from(params: PolygonParams) -> Self {
        Self::new(params.vertices)
    }
}

impl PolygonGeofence {
    pub fn new(vertices: Vec<GeoPoint>) -> Self {
        let ring: LineString<f64> = vertices.iter().map(GeoPoint::point).collect();
        Self {
            polygon: Polygon::new(ring, Vec::new()),
        }
    }

    pub fn vertex_count(&self) -> usize {
        let ring = self.polygon.exterior();
        if ring.is_closed() {
            ring.0.len().saturating_sub(1)
        } else {
            ring.0.len()
        }
    }
}

impl Geofence for PolygonGeofence {
    fn contains(&self, point: &GeoPoint) -> bool {
        self.vertex_count() >= 3 && self.polygon.contains(&point.point())
    }
}
