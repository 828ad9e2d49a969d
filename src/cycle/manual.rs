use crate::cycle::engine::LoadCycleEngine;
use crate::error::AppError;
use crate::model::{CycleKey, NewLoadCycle, PLACEHOLDER_TICKET};
use time::OffsetDateTime;
use tracing::{error, info};

/// Returned by [`LoadCycleEngine::record_manual_cycle`] when nothing was recorded.
pub const NOT_RECORDED: i64 = -1;

/// A cycle that is closed on creation, stamped `now`, with placeholder ticket
/// and tonnage for the operator to correct later.
pub fn manual_cycle(key: CycleKey, load_number: u32, now: OffsetDateTime) -> NewLoadCycle {
    NewLoadCycle {
        key,
        load_number,
        load: true,
        dump: true,
        load_arrival: Some(now),
        load_leave: Some(now),
        dump_arrival: Some(now),
        dump_leave: Some(now),
        ticket: Some(PLACEHOLDER_TICKET.to_string()),
        tons: Some(0.0),
    }
}

pub fn load_number_or_sentinel(key: &CycleKey, result: Result<u32, AppError>) -> i64 {
    match result {
        Ok(load_number) => i64::from(load_number),
        Err(err) => {
            error!(
                job_id = key.job_id,
                truck_id = key.truck_id,
                assignation_id = key.assignation_id,
                error = %err,
                "Manual load cycle not recorded"
            );
            NOT_RECORDED
        }
    }
}

impl LoadCycleEngine {
    pub fn try_record_manual_cycle(
        &self,
        key: CycleKey,
        now: OffsetDateTime,
    ) -> Result<u32, AppError> {
        let load_number = self.next_load_number(key.job_id, key.truck_id)?;
        let cycle = self.store().insert(manual_cycle(key, load_number, now))?;
        info!(
            job_id = key.job_id,
            truck_id = key.truck_id,
            assignation_id = key.assignation_id,
            load_number = cycle.load_number,
            "Manual load cycle recorded"
        );
        self.notify(key.job_id);
        Ok(cycle.load_number)
    }

    /// The new load number, or [`NOT_RECORDED`] on any store error.
    pub fn record_manual_cycle(&self, key: CycleKey, now: OffsetDateTime) -> i64 {
        load_number_or_sentinel(&key, self.try_record_manual_cycle(key, now))
    }
}
