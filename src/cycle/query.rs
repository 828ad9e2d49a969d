use crate::error::AppError;
use crate::model::{CycleKey, JobId, LoadCycle, TruckId};
use crate::store::{CycleFilter, CycleStore};

pub fn count_closed_cycles(store: &dyn CycleStore, key: &CycleKey) -> Result<usize, AppError> {
    let cycles = store.list(&CycleFilter::job(key.job_id).trucks([key.truck_id]))?;
    Ok(cycles
        .iter()
        .filter(|cycle| cycle.assignation_id == key.assignation_id && cycle.is_closed())
        .count())
}

/// A truck with no cycles has nothing missing and is complete.
pub fn is_cycle_set_complete(
    store: &dyn CycleStore,
    job_id: JobId,
    truck_id: TruckId,
) -> Result<bool, AppError> {
    let cycles = store.list(&CycleFilter::job(job_id).trucks([truck_id]))?;
    Ok(cycles.iter().all(LoadCycle::is_complete))
}

pub fn list_cycles(
    store: &dyn CycleStore,
    filter: &CycleFilter,
) -> Result<Vec<LoadCycle>, AppError> {
    store.list(filter)
}
