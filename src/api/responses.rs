use crate::model::{LoadCycle, TransitionEvent, ZoneClassification};
use crate::state::IngestStats;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum SampleStatus {
    Applied,
    Unassigned,
    Dropped,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropReasonCode {
    OutOfOrder,
    UnknownJob,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SampleSuccessResponse {
    pub status: SampleStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drop_reason: Option<DropReasonCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<ZoneClassification>,
    pub transitions: Vec<TransitionEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_cycles: Option<usize>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ManualCycleResponse {
    /// -1 when nothing was recorded
    pub load_number: i64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CyclesSuccessResponse {
    pub cycles: Vec<LoadCycle>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LoadsSuccessResponse {
    pub closed_cycles: usize,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CompleteSuccessResponse {
    pub complete: bool,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CycleSuccessResponse {
    pub cycle: LoadCycle,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub workers: usize,
    pub ingest: IngestStats,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct ErrorResponse {
    pub error_code: ErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    StoreUnavailable,
    Conflict,
    CycleNotFound,
    InvalidAmendment,
    InvalidQuery,
    WorkerUnavailable,
    InternalError,
}

#[derive(Debug, Deserialize)]
pub struct TicketRequest {
    pub ticket: String,
    pub tons: f64,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceRequest {
    pub invoice_id: u64,
}

/// Comma-separated id lists, e.g. `?trucks=1,2&invoices=9`.
#[derive(Debug, Default, Deserialize)]
pub struct CyclesQuery {
    pub trucks: Option<String>,
    pub invoices: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ZoneType;
    use serde_json::json;

    #[test]
    fn dropped_sample_response_omits_classification() {
        let response = SampleSuccessResponse {
            status: SampleStatus::Dropped,
            drop_reason: Some(DropReasonCode::OutOfOrder),
            classification: None,
            transitions: Vec::new(),
            closed_cycles: None,
            timestamp: "2026-03-02T07:00:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize sample response");
        assert_eq!(
            value,
            json!({
                "status": "dropped",
                "drop_reason": "OUT_OF_ORDER",
                "transitions": [],
                "timestamp": "2026-03-02T07:00:00Z"
            })
        );
    }

    #[test]
    fn applied_sample_response_includes_classification_and_count() {
        let response = SampleSuccessResponse {
            status: SampleStatus::Applied,
            drop_reason: None,
            classification: Some(ZoneClassification::stationary(7)),
            transitions: Vec::new(),
            closed_cycles: Some(3),
            timestamp: "2026-03-02T07:00:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize sample response");
        assert_eq!(
            value,
            json!({
                "status": "applied",
                "classification": { "zone_type": "STATIONARY", "stationary_minutes": 7 },
                "transitions": [],
                "closed_cycles": 3,
                "timestamp": "2026-03-02T07:00:00Z"
            })
        );
        let in_road = serde_json::to_value(ZoneClassification::zone(ZoneType::InRoad))
            .expect("serialize classification");
        assert_eq!(in_road, json!({ "zone_type": "IN_ROAD" }));
    }

    #[test]
    fn error_response_uses_screaming_snake_case_code() {
        let response = ErrorResponse {
            error_code: ErrorCode::StoreUnavailable,
            error_message: "cycle store unavailable: timeout".to_string(),
            timestamp: "2026-03-02T07:01:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize error response");
        assert_eq!(
            value,
            json!({
                "error_code": "STORE_UNAVAILABLE",
                "error_message": "cycle store unavailable: timeout",
                "timestamp": "2026-03-02T07:01:00Z"
            })
        );
    }

    #[test]
    fn manual_cycle_response_carries_sentinel() {
        let response = ManualCycleResponse {
            load_number: -1,
            timestamp: "2026-03-02T07:02:00Z".to_string(),
        };

        let value = serde_json::to_value(response).expect("serialize manual response");
        assert_eq!(
            value,
            json!({ "load_number": -1, "timestamp": "2026-03-02T07:02:00Z" })
        );
    }
}
