use crate::geofence::{GeoPoint, Geofence};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RadiusGeofence {
    pub center: GeoPoint,
    pub radius_m: f64,
}

impl RadiusGeofence {
    pub fn new(center: GeoPoint, radius_m: f64) -> Self {
        Self { center, radius_m }
    }
}

impl Geofence for RadiusGeofence {
    fn contains(&self, point: &GeoPoint) -> bool {
        self.center.distance_m(point) <= self.radius_m
    }
}
