use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

pub type JobId = u64;
pub type TruckId = u64;
pub type DriverId = u64;
pub type UserId = u64;
pub type AssignationId = u64;
pub type CycleId = u64;
pub type InvoiceId = u64;

/// Tickets recorded by the manual override until an operator enters the real one.
pub const PLACEHOLDER_TICKET: &str = "0";

/// A ping without a fix still advances ordering but classifies as in-road.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub job_id: JobId,
    pub truck_id: TruckId,
    pub driver_id: DriverId,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    /// in m/s
    #[serde(default)]
    pub speed: Option<f64>,
}

impl PositionSample {
    pub fn sample_key(&self) -> SampleKey {
        SampleKey {
            job_id: self.job_id,
            truck_id: self.truck_id,
            driver_id: self.driver_id,
        }
    }

    pub fn truck_key(&self) -> TruckKey {
        TruckKey {
            job_id: self.job_id,
            truck_id: self.truck_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleKey {
    pub job_id: JobId,
    pub truck_id: TruckId,
    pub driver_id: DriverId,
}

/// Unit of serialization: every command for the same (job, truck) runs on one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TruckKey {
    pub job_id: JobId,
    pub truck_id: TruckId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CycleKey {
    pub job_id: JobId,
    pub truck_id: TruckId,
    pub assignation_id: AssignationId,
}

impl CycleKey {
    pub fn truck_key(&self) -> TruckKey {
        TruckKey {
            job_id: self.job_id,
            truck_id: self.truck_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ZoneType {
    LoadSite,
    DumpSite,
    Stationary,
    InRoad,
}

impl ZoneType {
    pub fn is_site(self) -> bool {
        matches!(self, Self::LoadSite | Self::DumpSite)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ZoneClassification {
    pub zone_type: ZoneType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stationary_minutes: Option<i64>,
}

impl ZoneClassification {
    pub fn zone(zone_type: ZoneType) -> Self {
        Self {
            zone_type,
            stationary_minutes: None,
        }
    }

    pub fn stationary(minutes: i64) -> Self {
        Self {
            zone_type: ZoneType::Stationary,
            stationary_minutes: Some(minutes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionAction {
    Enter,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub job_id: JobId,
    pub truck_id: TruckId,
    pub driver_id: DriverId,
    pub zone_type: ZoneType,
    pub action: TransitionAction,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadCycle {
    pub id: CycleId,
    pub job_id: JobId,
    pub truck_id: TruckId,
    pub assignation_id: AssignationId,
    pub load_number: u32,
    pub load: bool,
    pub dump: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub load_arrival: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub load_leave: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub dump_arrival: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub dump_leave: Option<OffsetDateTime>,
    pub ticket: Option<String>,
    pub tons: Option<f64>,
    pub driver_invoice_id: Option<InvoiceId>,
}

impl LoadCycle {
    pub fn key(&self) -> CycleKey {
        CycleKey {
            job_id: self.job_id,
            truck_id: self.truck_id,
            assignation_id: self.assignation_id,
        }
    }

    /// Both stages reached; this is what counts as one load for billing.
    pub fn is_closed(&self) -> bool {
        self.load && self.dump
    }

    pub fn is_complete(&self) -> bool {
        self.ticket.is_some() && self.tons.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewLoadCycle {
    pub key: CycleKey,
    pub load_number: u32,
    pub load: bool,
    pub dump: bool,
    pub load_arrival: Option<OffsetDateTime>,
    pub load_leave: Option<OffsetDateTime>,
    pub dump_arrival: Option<OffsetDateTime>,
    pub dump_leave: Option<OffsetDateTime>,
    pub ticket: Option<String>,
    pub tons: Option<f64>,
}

impl NewLoadCycle {
    pub fn arrived_at_load(key: CycleKey, load_number: u32, arrival: OffsetDateTime) -> Self {
        Self {
            key,
            load_number,
            load: true,
            dump: false,
            load_arrival: Some(arrival),
            load_leave: None,
            dump_arrival: None,
            dump_leave: None,
            ticket: None,
            tons: None,
        }
    }
}
