use crate::model::{AssignationId, CycleId, JobId, TruckId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("cycle store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(
        "load {load_number} already recorded for job {job_id} truck {truck_id} assignation {assignation_id}"
    )]
    Conflict {
        job_id: JobId,
        truck_id: TruckId,
        assignation_id: AssignationId,
        load_number: u32,
    },
    #[error("load cycle {0} not found")]
    CycleNotFound(CycleId),
    #[error("invalid amendment: {0}")]
    InvalidAmendment(String),
    #[error("event publish failed: {0}")]
    Publish(String),
    #[error("worker for job {job_id} truck {truck_id} stopped")]
    WorkerStopped { job_id: JobId, truck_id: TruckId },
    #[error("state lock poisoned")]
    StateLock,
}

impl AppError {
    /// Errors after which the triggering event was not applied and may be sent again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_) | Self::Conflict { .. })
    }
}
