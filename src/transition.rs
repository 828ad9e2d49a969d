use crate::model::{
    PositionSample, SampleKey, TransitionAction, TransitionEvent, ZoneClassification,
};
use std::collections::HashMap;
use time::OffsetDateTime;
use tracing::warn;

/// Load straight to dump yields EXIT(load) then ENTER(dump). No history
/// behaves like coming from outside every site.
pub fn detect(
    key: SampleKey,
    current: ZoneClassification,
    previous: Option<ZoneClassification>,
    timestamp: OffsetDateTime,
) -> Vec<TransitionEvent> {
    let previous_zone = previous.map(|p| p.zone_type);
    let event = |zone_type, action| TransitionEvent {
        job_id: key.job_id,
        truck_id: key.truck_id,
        driver_id: key.driver_id,
        zone_type,
        action,
        timestamp,
    };

    let mut events = Vec::new();
    if let Some(previous_zone) = previous_zone
        && previous_zone.is_site()
        && previous_zone != current.zone_type
    {
        events.push(event(previous_zone, TransitionAction::Exit));
    }
    if current.zone_type.is_site() && previous_zone != Some(current.zone_type) {
        events.push(event(current.zone_type, TransitionAction::Enter));
    }
    events
}

#[derive(Debug, Clone, Copy)]
struct LastSeen {
    classification: ZoneClassification,
    timestamp: OffsetDateTime,
}

/// Last accepted classification per key. Only [`TransitionTracker::commit`]
/// after the events were applied, so a failed sample replays.
#[derive(Debug, Default)]
pub struct TransitionTracker {
    last: HashMap<SampleKey, LastSeen>,
}

impl TransitionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// False for samples older than the last accepted one for the key.
    pub fn accepts(&self, sample: &PositionSample) -> bool {
        let key = sample.sample_key();
        match self.last.get(&key) {
            Some(last) if sample.timestamp < last.timestamp => {
                warn!(
                    job_id = key.job_id,
                    truck_id = key.truck_id,
                    driver_id = key.driver_id,
                    sample_at = %sample.timestamp,
                    last_at = %last.timestamp,
                    "Dropping out-of-order sample"
                );
                false
            }
            _ => true,
        }
    }

    pub fn previous(&self, key: &SampleKey) -> Option<ZoneClassification> {
        self.last.get(key).map(|last| last.classification)
    }

    pub fn transitions(
        &self,
        sample: &PositionSample,
        current: ZoneClassification,
    ) -> Vec<TransitionEvent> {
        let key = sample.sample_key();
        detect(key, current, self.previous(&key), sample.timestamp)
    }

    /// True while any key was last seen inside a load or dump site.
    pub fn inside_site(&self) -> bool {
        self.last
            .values()
            .any(|last| last.classification.zone_type.is_site())
    }

    pub fn commit(&mut self, sample: &PositionSample, classification: ZoneClassification) {
        self.last.insert(
            sample.sample_key(),
            LastSeen {
                classification,
                timestamp: sample.timestamp,
            },
        );
    }
}
