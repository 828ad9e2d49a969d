use crate::cycle::engine::LoadCycleEngine;
use crate::error::AppError;
use crate::model::{CycleId, InvoiceId, LoadCycle, TruckKey};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub enum Amendment {
    Ticket { ticket: String, tons: f64 },
    Invoice { invoice_id: InvoiceId },
}

impl Amendment {
    fn validate(&self) -> Result<(), AppError> {
        match self {
            Amendment::Ticket { ticket, tons } => {
                if ticket.trim().is_empty() {
                    return Err(AppError::InvalidAmendment("ticket is empty".to_string()));
                }
                if !tons.is_finite() || *tons < 0.0 {
                    return Err(AppError::InvalidAmendment(format!(
                        "tons must be a non-negative number, got {tons}"
                    )));
                }
                Ok(())
            }
            Amendment::Invoice { .. } => Ok(()),
        }
    }
}

impl LoadCycleEngine {
    /// Cycles of other trucks are reported as not found.
    pub fn amend(
        &self,
        truck: TruckKey,
        cycle_id: CycleId,
        amendment: &Amendment,
    ) -> Result<LoadCycle, AppError> {
        amendment.validate()?;
        let mut cycle = self
            .store()
            .get(cycle_id)?
            .filter(|cycle| cycle.job_id == truck.job_id && cycle.truck_id == truck.truck_id)
            .ok_or(AppError::CycleNotFound(cycle_id))?;

        match amendment {
            Amendment::Ticket { ticket, tons } => {
                cycle.ticket = Some(ticket.trim().to_string());
                cycle.tons = Some(*tons);
            }
            Amendment::Invoice { invoice_id } => {
                cycle.driver_invoice_id = Some(*invoice_id);
            }
        }
        self.store().update(&cycle)?;
        info!(
            job_id = cycle.job_id,
            truck_id = cycle.truck_id,
            load_number = cycle.load_number,
            amendment = ?amendment,
            "Load cycle amended"
        );
        self.notify(cycle.job_id);
        Ok(cycle)
    }
}
