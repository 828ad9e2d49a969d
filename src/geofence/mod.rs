use geo::{Distance, Haversine, Point};
use serde::Deserialize;
use std::fmt::Debug;

pub mod polygon;
pub mod radius;

pub use polygon::PolygonGeofence;
pub use radius::RadiusGeofence;

#[derive(Debug, Deserialize)]
struct Coordinates {
    latitude: f64,
    longitude: f64,
}

/// WGS84 position, stored as a `geo` point (x = longitude, y = latitude).
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(from = "Coordinates")]
pub struct GeoPoint(Point<f64>);

impl From<Coordinates> for GeoPoint {
    fn from(coordinates: Coordinates) -> Self {
        Self::new(coordinates.latitude, coordinates.longitude)
    }
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self(Point::new(longitude, latitude))
    }

    /// None for missing, non-finite or out-of-range coordinates.
    pub fn from_coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Option<Self> {
        let (latitude, longitude) = (latitude?, longitude?);
        if !latitude.is_finite() || !longitude.is_finite() {
            return None;
        }
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self::new(latitude, longitude))
    }

    pub fn point(&self) -> Point<f64> {
        self.0
    }

    pub fn distance_m(&self, other: &GeoPoint) -> f64 {
        Haversine::distance(self.0, other.0)
    }
}

pub trait Geofence: Send + Sync + Debug {
    fn contains(&self, point: &GeoPoint) -> bool;
}
