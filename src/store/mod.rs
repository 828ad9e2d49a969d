use crate::error::AppError;
use crate::model::{CycleId, CycleKey, InvoiceId, JobId, LoadCycle, NewLoadCycle, TruckId};
use std::fmt::Debug;

pub mod memory;

pub use memory::MemoryCycleStore;

/// Selection of cycles for one job. Empty lists do not restrict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleFilter {
    pub job_id: JobId,
    pub truck_ids: Vec<TruckId>,
    pub invoice_ids: Vec<InvoiceId>,
}

impl CycleFilter {
    pub fn job(job_id: JobId) -> Self {
        Self {
            job_id,
            ..Self::default()
        }
    }

    pub fn trucks(mut self, truck_ids: impl IntoIterator<Item = TruckId>) -> Self {
        self.truck_ids = truck_ids.into_iter().collect();
        self
    }

    pub fn invoices(mut self, invoice_ids: impl IntoIterator<Item = InvoiceId>) -> Self {
        self.invoice_ids = invoice_ids.into_iter().collect();
        self
    }

    pub fn matches(&self, cycle: &LoadCycle) -> bool {
        cycle.job_id == self.job_id
            && (self.truck_ids.is_empty() || self.truck_ids.contains(&cycle.truck_id))
            && (self.invoice_ids.is_empty()
                || cycle
                    .driver_invoice_id
                    .is_some_and(|invoice| self.invoice_ids.contains(&invoice)))
    }
}

/// Implementations must reject an insert whose (job, truck, assignation,
/// load number) already exists with [`AppError::Conflict`], and report any
/// backend outage as [`AppError::StoreUnavailable`] without partial writes.
pub trait CycleStore: Send + Sync + Debug {
    /// Cycle with the highest load number for the key.
    fn latest(&self, key: &CycleKey) -> Result<Option<LoadCycle>, AppError>;

    /// Highest load number recorded for the (job, truck) pair across assignations.
    fn max_load_number(&self, job_id: JobId, truck_id: TruckId) -> Result<Option<u32>, AppError>;

    fn insert(&self, cycle: NewLoadCycle) -> Result<LoadCycle, AppError>;

    fn update(&self, cycle: &LoadCycle) -> Result<(), AppError>;

    fn get(&self, id: CycleId) -> Result<Option<LoadCycle>, AppError>;

    /// Matching cycles ordered by load number, then truck, then assignation.
    fn list(&self, filter: &CycleFilter) -> Result<Vec<LoadCycle>, AppError>;
}
