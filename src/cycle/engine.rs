use crate::cycle::query::count_closed_cycles;
use crate::directory::JobDirectory;
use crate::error::AppError;
use crate::events::{CycleEventPublisher, CycleListUpdated};
use crate::model::{
    AssignationId, CycleKey, JobId, LoadCycle, NewLoadCycle, TransitionAction, TransitionEvent,
    TruckId, ZoneType,
};
use crate::store::{CycleFilter, CycleStore};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

/// Stage length recorded when a leave timestamp precedes its arrival.
// TODO: revisit once trackers report a monotonic sequence number; ordering by
// sequence would make this substitution unnecessary.
pub const SKEW_CORRECTION: Duration = Duration::minutes(3);

/// Where a (job, truck, assignation) stands, derived from its latest cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    NoActiveCycle,
    Loading,
    EnRouteToDump,
    /// At the dump site. Counts as closed for numbering and billing already.
    Dumping,
    Closed,
}

impl CycleState {
    pub fn of(latest: Option<&LoadCycle>) -> Self {
        let Some(cycle) = latest else {
            return Self::NoActiveCycle;
        };
        if cycle.is_closed() {
            return if cycle.dump_leave.is_some() {
                Self::Closed
            } else {
                Self::Dumping
            };
        }
        if cycle.load_leave.is_none() {
            Self::Loading
        } else if cycle.dump_arrival.is_none() {
            Self::EnRouteToDump
        } else {
            Self::Dumping
        }
    }

    /// A LOAD_SITE ENTER opens a new cycle only from here.
    pub fn accepts_new_cycle(self) -> bool {
        matches!(self, Self::NoActiveCycle | Self::Closed | Self::Dumping)
    }
}

pub fn skew_corrected(arrival: OffsetDateTime, leave: OffsetDateTime) -> OffsetDateTime {
    if leave < arrival {
        arrival + SKEW_CORRECTION
    } else {
        leave
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Open(OffsetDateTime),
    Update(LoadCycle),
    Ignore(&'static str),
}

fn plan(latest: Option<&LoadCycle>, event: &TransitionEvent) -> Step {
    let ts = event.timestamp;
    match (event.zone_type, event.action) {
        (ZoneType::LoadSite, TransitionAction::Enter) => {
            if CycleState::of(latest).accepts_new_cycle() {
                Step::Open(ts)
            } else {
                Step::Ignore("load site re-entered during an open cycle")
            }
        }
        (ZoneType::LoadSite, TransitionAction::Exit) => match latest {
            Some(cycle) if cycle.load && cycle.load_leave.is_none() => {
                let Some(arrival) = cycle.load_arrival else {
                    return Step::Ignore("load exit without recorded arrival");
                };
                let mut next = cycle.clone();
                next.load_leave = Some(skew_corrected(arrival, ts));
                Step::Update(next)
            }
            _ => Step::Ignore("load exit outside loading"),
        },
        (ZoneType::DumpSite, TransitionAction::Enter) => match latest {
            Some(cycle) if cycle.dump_arrival.is_none() => {
                let mut next = cycle.clone();
                next.dump = true;
                next.dump_arrival = Some(ts);
                Step::Update(next)
            }
            Some(_) => Step::Ignore("dump arrival already recorded"),
            None => Step::Ignore("dump entered with no cycle"),
        },
        (ZoneType::DumpSite, TransitionAction::Exit) => match latest {
            Some(cycle) if cycle.dump && cycle.dump_leave.is_none() => {
                let Some(arrival) = cycle.dump_arrival else {
                    return Step::Ignore("dump exit without recorded arrival");
                };
                let mut next = cycle.clone();
                next.dump_leave = Some(skew_corrected(arrival, ts));
                Step::Update(next)
            }
            _ => Step::Ignore("dump exit outside dumping"),
        },
        (ZoneType::Stationary | ZoneType::InRoad, _) => Step::Ignore("not a site transition"),
    }
}

/// Not safe to call concurrently for the same (job, truck); run it behind
/// [`crate::dispatch::Dispatcher`].
#[derive(Debug, Clone)]
pub struct LoadCycleEngine {
    store: Arc<dyn CycleStore>,
    publisher: Arc<dyn CycleEventPublisher>,
    directory: Arc<dyn JobDirectory>,
}

impl LoadCycleEngine {
    pub fn new(
        store: Arc<dyn CycleStore>,
        publisher: Arc<dyn CycleEventPublisher>,
        directory: Arc<dyn JobDirectory>,
    ) -> Self {
        Self {
            store,
            publisher,
            directory,
        }
    }

    pub fn store(&self) -> &Arc<dyn CycleStore> {
        &self.store
    }

    pub fn directory(&self) -> &Arc<dyn JobDirectory> {
        &self.directory
    }

    /// Returns the closed-cycle count for the key. Events that do not fit the
    /// current state are ignored.
    pub fn apply(
        &self,
        assignation_id: AssignationId,
        event: &TransitionEvent,
    ) -> Result<usize, AppError> {
        let key = CycleKey {
            job_id: event.job_id,
            truck_id: event.truck_id,
            assignation_id,
        };
        let latest = self.store.latest(&key)?;

        match plan(latest.as_ref(), event) {
            Step::Ignore(reason) => {
                debug!(
                    job_id = key.job_id,
                    truck_id = key.truck_id,
                    assignation_id = key.assignation_id,
                    zone = ?event.zone_type,
                    action = ?event.action,
                    state = ?CycleState::of(latest.as_ref()),
                    reason,
                    "Transition ignored"
                );
            }
            Step::Open(arrival) => {
                let load_number = self.next_load_number(key.job_id, key.truck_id)?;
                let cycle = self
                    .store
                    .insert(NewLoadCycle::arrived_at_load(key, load_number, arrival))?;
                info!(
                    job_id = key.job_id,
                    truck_id = key.truck_id,
                    assignation_id = key.assignation_id,
                    load_number = cycle.load_number,
                    "Load cycle opened"
                );
                self.notify(key.job_id);
            }
            Step::Update(cycle) => {
                self.store.update(&cycle)?;
                if (event.zone_type, event.action) == (ZoneType::DumpSite, TransitionAction::Exit) {
                    info!(
                        job_id = key.job_id,
                        truck_id = key.truck_id,
                        assignation_id = key.assignation_id,
                        load_number = cycle.load_number,
                        "Load cycle closed"
                    );
                }
                self.notify(key.job_id);
            }
        }

        count_closed_cycles(self.store.as_ref(), &key)
    }

    pub(crate) fn next_load_number(
        &self,
        job_id: JobId,
        truck_id: TruckId,
    ) -> Result<u32, AppError> {
        Ok(self
            .store
            .max_load_number(job_id, truck_id)?
            .map_or(1, |last| last + 1))
    }

    // the write already happened, so publish failures are only logged
    pub(crate) fn notify(&self, job_id: JobId) {
        let cycles = match self.store.list(&CycleFilter::job(job_id)) {
            Ok(cycles) => cycles,
            Err(err) => {
                warn!(job_id, error = %err, "Failed to read cycles for notification");
                return;
            }
        };
        let event = CycleListUpdated {
            job_id,
            user_id: self.directory.owner(job_id),
            cycles,
        };
        if let Err(err) = self.publisher.publish(event) {
            warn!(job_id, error = %err, "Failed to publish cycle list update");
        }
    }
}
