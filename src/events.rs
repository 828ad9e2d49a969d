//! Outbound "cycle list updated" notifications.

use crate::error::AppError;
use crate::model::{JobId, LoadCycle, UserId};
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Mutex;
use tokio::sync::broadcast;

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleListUpdated {
    pub job_id: JobId,
    pub user_id: Option<UserId>,
    pub cycles: Vec<LoadCycle>,
}

pub trait CycleEventPublisher: Send + Sync + Debug {
    fn publish(&self, event: CycleListUpdated) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: broadcast::Sender<CycleListUpdated>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleListUpdated> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl CycleEventPublisher for BroadcastPublisher {
    fn publish(&self, event: CycleListUpdated) -> Result<(), AppError> {
        // No subscriber is not a failure: nobody is watching this job right now.
        if self.tx.receiver_count() == 0 {
            return Ok(());
        }
        self.tx
            .send(event)
            .map(|_| ())
            .map_err(|err| AppError::Publish(err.to_string()))
    }
}

/// Keeps every published event in memory.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<CycleListUpdated>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A publisher whose every publish fails.
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<CycleListUpdated> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl CycleEventPublisher for RecordingPublisher {
    fn publish(&self, event: CycleListUpdated) -> Result<(), AppError> {
        if self.fail {
            return Err(AppError::Publish("recording publisher set to fail".to_string()));
        }
        self.events
            .lock()
            .map_err(|_| AppError::StateLock)?
            .push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(job_id: JobId) -> CycleListUpdated {
        CycleListUpdated {
            job_id,
            user_id: Some(7),
            cycles: Vec::new(),
        }
    }

    #[test]
    fn broadcast_without_subscribers_is_ok() {
        let publisher = BroadcastPublisher::default();

        assert!(publisher.publish(event(1)).is_ok());
    }

    #[test]
    fn broadcast_reaches_subscribers() -> Result<(), Box<dyn std::error::Error>> {
        let publisher = BroadcastPublisher::new(4);
        let mut rx = publisher.subscribe();

        publisher.publish(event(3))?;

        assert_eq!(rx.try_recv()?, event(3));
        Ok(())
    }

    #[test]
    fn payload_shape() -> Result<(), serde_json::Error> {
        let value = serde_json::to_value(event(5))?;

        assert_eq!(value, json!({ "job_id": 5, "user_id": 7, "cycles": [] }));
        Ok(())
    }

    #[test]
    fn recording_publisher_keeps_events_in_order() -> Result<(), AppError> {
        let publisher = RecordingPublisher::new();

        publisher.publish(event(1))?;
        publisher.publish(event(2))?;

        let jobs: Vec<JobId> = publisher.events().iter().map(|e| e.job_id).collect();
        assert_eq!(jobs, vec![1, 2]);
        assert!(RecordingPublisher::failing().publish(event(1)).is_err());
        Ok(())
    }
}
