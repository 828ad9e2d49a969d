use crate::directory::JobSites;
use crate::geofence::GeoPoint;
use crate::model::{PositionSample, SampleKey, ZoneClassification, ZoneType};
use std::collections::HashMap;
use time::{Duration, OffsetDateTime};
use tracing::debug;

pub const DEFAULT_STATIONARY_RADIUS_M: f64 = 30.0;
pub const DEFAULT_STATIONARY_MIN_MINUTES: u64 = 5;
pub const DEFAULT_MOVING_SPEED_MPS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Movement below this distance from the anchor does not count as moving.
    pub stationary_radius_m: f64,
    /// How long a truck must stand still before it is reported STATIONARY.
    pub stationary_min_duration: Duration,
    /// Reported speed above which the truck is moving regardless of position.
    pub moving_speed_mps: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            stationary_radius_m: DEFAULT_STATIONARY_RADIUS_M,
            stationary_min_duration: Duration::minutes(DEFAULT_STATIONARY_MIN_MINUTES as i64),
            moving_speed_mps: DEFAULT_MOVING_SPEED_MPS,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StillWindow {
    anchor: GeoPoint,
    since: OffsetDateTime,
}

/// Site membership first. Off site, a truck held within `stationary_radius_m`
/// of one anchor for `stationary_min_duration` is STATIONARY.
#[derive(Debug, Default)]
pub struct ZoneClassifier {
    config: ClassifierConfig,
    windows: HashMap<SampleKey, StillWindow>,
}

impl ZoneClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            windows: HashMap::new(),
        }
    }

    pub fn classify(&mut self, sample: &PositionSample, sites: &JobSites) -> ZoneClassification {
        let key = sample.sample_key();
        let Some(point) = GeoPoint::from_coordinates(sample.latitude, sample.longitude) else {
            debug!(
                job_id = key.job_id,
                truck_id = key.truck_id,
                driver_id = key.driver_id,
                "Sample without usable coordinates classified as in-road"
            );
            return ZoneClassification::zone(ZoneType::InRoad);
        };

        if let Some(zone) = sites.zone_at(&point) {
            self.windows.remove(&key);
            return ZoneClassification::zone(zone);
        }

        let moving_fast = sample
            .speed
            .is_some_and(|speed| speed.is_finite() && speed > self.config.moving_speed_mps);

        let kept = self.windows.get(&key).copied().filter(|window| {
            !moving_fast
                && window.anchor.distance_m(&point) <= self.config.stationary_radius_m
                && sample.timestamp >= window.since
        });
        let window = match kept {
            Some(window) => window,
            None => {
                let window = StillWindow {
                    anchor: point,
                    since: sample.timestamp,
                };
                self.windows.insert(key, window);
                window
            }
        };

        let still_for = sample.timestamp - window.since;
        if !moving_fast && still_for >= self.config.stationary_min_duration {
            ZoneClassification::stationary(still_for.whole_minutes())
        } else {
            ZoneClassification::zone(ZoneType::InRoad)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::{Geofence, RadiusGeofence};
    use std::sync::Arc;
    use time::macros::datetime;

    const LOAD: (f64, f64) = (19.40, -99.10);
    const DUMP: (f64, f64) = (19.50, -99.20);

    fn sites() -> JobSites {
        let load: Arc<dyn Geofence> = Arc::new(RadiusGeofence::new(
            GeoPoint::new(LOAD.0, LOAD.1),
            200.0,
        ));
        let dump: Arc<dyn Geofence> = Arc::new(RadiusGeofence::new(
            GeoPoint::new(DUMP.0, DUMP.1),
            200.0,
        ));
        JobSites {
            load_sites: vec![load],
            dump_sites: vec![dump],
        }
    }

    fn sample(latitude: f64, longitude: f64, timestamp: OffsetDateTime) -> PositionSample {
        PositionSample {
            job_id: 1,
            truck_id: 2,
            driver_id: 3,
            latitude: Some(latitude),
            longitude: Some(longitude),
            timestamp,
            speed: None,
        }
    }

    #[test]
    fn classifies_site_membership() {
        let mut classifier = ZoneClassifier::default();
        let t0 = datetime!(2026-03-02 07:00 UTC);

        assert_eq!(
            classifier.classify(&sample(LOAD.0, LOAD.1, t0), &sites()).zone_type,
            ZoneType::LoadSite
        );
        assert_eq!(
            classifier.classify(&sample(DUMP.0, DUMP.1, t0), &sites()).zone_type,
            ZoneType::DumpSite
        );
        assert_eq!(
            classifier.classify(&sample(19.45, -99.15, t0), &sites()).zone_type,
            ZoneType::InRoad
        );
    }

    #[test]
    fn missing_coordinates_classify_in_road() {
        let mut classifier = ZoneClassifier::default();
        let mut ping = sample(LOAD.0, LOAD.1, datetime!(2026-03-02 07:00 UTC));
        ping.longitude = None;

        let classification = classifier.classify(&ping, &sites());

        assert_eq!(classification, ZoneClassification::zone(ZoneType::InRoad));
    }

    #[test]
    fn standing_still_becomes_stationary_after_threshold() {
        let mut classifier = ZoneClassifier::default();
        let t0 = datetime!(2026-03-02 07:00 UTC);

        let first = classifier.classify(&sample(19.45, -99.15, t0), &sites());
        let early = classifier.classify(
            &sample(19.45005, -99.15, t0 + Duration::minutes(3)),
            &sites(),
        );
        let later = classifier.classify(
            &sample(19.45, -99.15005, t0 + Duration::minutes(7)),
            &sites(),
        );

        assert_eq!(first.zone_type, ZoneType::InRoad);
        assert_eq!(early.zone_type, ZoneType::InRoad);
        assert_eq!(later, ZoneClassification::stationary(7));
    }

    #[test]
    fn moving_resets_the_stationary_window() {
        let mut classifier = ZoneClassifier::default();
        let t0 = datetime!(2026-03-02 07:00 UTC);

        classifier.classify(&sample(19.45, -99.15, t0), &sites());
        // ~1.1 km away
        classifier.classify(&sample(19.46, -99.15, t0 + Duration::minutes(6)), &sites());
        let after_move = classifier.classify(
            &sample(19.46, -99.15, t0 + Duration::minutes(10)),
            &sites(),
        );

        assert_eq!(after_move.zone_type, ZoneType::InRoad);
    }

    #[test]
    fn reported_speed_counts_as_movement() {
        let mut classifier = ZoneClassifier::default();
        let t0 = datetime!(2026-03-02 07:00 UTC);

        classifier.classify(&sample(19.45, -99.15, t0), &sites());
        let mut creeping = sample(19.45, -99.15, t0 + Duration::minutes(8));
        creeping.speed = Some(6.0);

        assert_eq!(
            classifier.classify(&creeping, &sites()).zone_type,
            ZoneType::InRoad
        );
    }

    #[test]
    fn windows_are_scoped_per_driver() {
        let mut classifier = ZoneClassifier::default();
        let t0 = datetime!(2026-03-02 07:00 UTC);

        classifier.classify(&sample(19.45, -99.15, t0), &sites());
        let mut other_driver = sample(19.45, -99.15, t0 + Duration::minutes(9));
        other_driver.driver_id = 4;

        assert_eq!(
            classifier.classify(&other_driver, &sites()).zone_type,
            ZoneType::InRoad
        );
    }
}
