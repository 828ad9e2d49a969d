use crate::api::responses::{
    CompleteSuccessResponse, CycleSuccessResponse, CyclesQuery, CyclesSuccessResponse,
    DropReasonCode, ErrorCode, ErrorResponse, HealthStatus, HealthSuccessResponse,
    InvoiceRequest, LoadsSuccessResponse, ManualCycleResponse, SampleStatus,
    SampleSuccessResponse, TicketRequest,
};
use crate::cycle::{
    Amendment, NOT_RECORDED, count_closed_cycles, is_cycle_set_complete, list_cycles,
};
use crate::dispatch::{Dispatcher, DropReason, SampleOutcome};
use crate::error::AppError;
use crate::model::{
    AssignationId, CycleId, CycleKey, JobId, LoadCycle, PositionSample, TruckId, TruckKey,
};
use crate::state::AppState;
use crate::store::CycleFilter;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{error, warn};

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Debug)]
enum TimestampError {
    Format(time::error::Format),
}

impl fmt::Display for TimestampError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimestampError::Format(err) => write!(f, "timestamp format error: {err}"),
        }
    }
}

pub enum ApiResponse<T> {
    Success { status: StatusCode, body: T },
    Error { status: StatusCode, body: ErrorResponse },
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            ApiResponse::Success { status, body } => (status, Json(body)).into_response(),
            ApiResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn post_sample(
    State(dispatcher): State<Dispatcher>,
    Json(sample): Json<PositionSample>,
) -> impl IntoResponse {
    let result = dispatcher.submit_sample(sample).await;
    build_sample_response(result, OffsetDateTime::now_utc())
}

pub async fn post_manual_cycle(
    State(dispatcher): State<Dispatcher>,
    Path((job_id, truck_id, assignation_id)): Path<(JobId, TruckId, AssignationId)>,
) -> impl IntoResponse {
    let key = CycleKey {
        job_id,
        truck_id,
        assignation_id,
    };
    let now = OffsetDateTime::now_utc();
    let load_number = dispatcher.record_manual_cycle(key, now).await;
    build_manual_cycle_response(load_number, now)
}

pub async fn get_cycles(
    State(dispatcher): State<Dispatcher>,
    Path(job_id): Path<JobId>,
    Query(query): Query<CyclesQuery>,
) -> impl IntoResponse {
    build_cycles_response(&dispatcher, job_id, &query, OffsetDateTime::now_utc())
}

pub async fn get_loads(
    State(dispatcher): State<Dispatcher>,
    Path((job_id, truck_id, assignation_id)): Path<(JobId, TruckId, AssignationId)>,
) -> impl IntoResponse {
    let key = CycleKey {
        job_id,
        truck_id,
        assignation_id,
    };
    let result = count_closed_cycles(dispatcher.engine().store().as_ref(), &key);
    build_loads_response(result, OffsetDateTime::now_utc())
}

pub async fn get_complete(
    State(dispatcher): State<Dispatcher>,
    Path((job_id, truck_id)): Path<(JobId, TruckId)>,
) -> impl IntoResponse {
    let result = is_cycle_set_complete(dispatcher.engine().store().as_ref(), job_id, truck_id);
    build_complete_response(result, OffsetDateTime::now_utc())
}

pub async fn put_ticket(
    State(dispatcher): State<Dispatcher>,
    Path((job_id, truck_id, cycle_id)): Path<(JobId, TruckId, CycleId)>,
    Json(request): Json<TicketRequest>,
) -> impl IntoResponse {
    let amendment = Amendment::Ticket {
        ticket: request.ticket,
        tons: request.tons,
    };
    let truck = TruckKey { job_id, truck_id };
    let result = dispatcher.amend(truck, cycle_id, amendment).await;
    build_cycle_response(result, OffsetDateTime::now_utc())
}

pub async fn put_invoice(
    State(dispatcher): State<Dispatcher>,
    Path((job_id, truck_id, cycle_id)): Path<(JobId, TruckId, CycleId)>,
    Json(request): Json<InvoiceRequest>,
) -> impl IntoResponse {
    let amendment = Amendment::Invoice {
        invoice_id: request.invoice_id,
    };
    let truck = TruckKey { job_id, truck_id };
    let result = dispatcher.amend(truck, cycle_id, amendment).await;
    build_cycle_response(result, OffsetDateTime::now_utc())
}

pub async fn get_health(State(dispatcher): State<Dispatcher>) -> impl IntoResponse {
    let workers = dispatcher.worker_count().await;
    build_health_response(dispatcher.state(), workers, OffsetDateTime::now_utc())
}

fn build_sample_response(
    result: Result<SampleOutcome, AppError>,
    now: OffsetDateTime,
) -> ApiResponse<SampleSuccessResponse> {
    let outcome = match result {
        Ok(outcome) => outcome,
        Err(err) => return error_response(&err, now),
    };
    success(StatusCode::OK, now, |timestamp| match outcome {
        SampleOutcome::Applied {
            classification,
            events,
            closed_cycles,
        } => SampleSuccessResponse {
            status: SampleStatus::Applied,
            drop_reason: None,
            classification: Some(classification),
            transitions: events,
            closed_cycles,
            timestamp,
        },
        SampleOutcome::Unassigned {
            classification,
            events,
        } => SampleSuccessResponse {
            status: SampleStatus::Unassigned,
            drop_reason: None,
            classification: Some(classification),
            transitions: events,
            closed_cycles: None,
            timestamp,
        },
        SampleOutcome::Dropped(reason) => SampleSuccessResponse {
            status: SampleStatus::Dropped,
            drop_reason: Some(match reason {
                DropReason::OutOfOrder => DropReasonCode::OutOfOrder,
                DropReason::UnknownJob => DropReasonCode::UnknownJob,
            }),
            classification: None,
            transitions: Vec::new(),
            closed_cycles: None,
            timestamp,
        },
    })
}

fn build_manual_cycle_response(
    load_number: i64,
    now: OffsetDateTime,
) -> ApiResponse<ManualCycleResponse> {
    let status = if load_number == NOT_RECORDED {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::CREATED
    };
    success(status, now, |timestamp| ManualCycleResponse {
        load_number,
        timestamp,
    })
}

fn build_cycles_response(
    dispatcher: &Dispatcher,
    job_id: JobId,
    query: &CyclesQuery,
    now: OffsetDateTime,
) -> ApiResponse<CyclesSuccessResponse> {
    let filter = match cycle_filter(job_id, query) {
        Ok(filter) => filter,
        Err(message) => {
            return error_body(StatusCode::BAD_REQUEST, ErrorCode::InvalidQuery, message, now);
        }
    };
    match list_cycles(dispatcher.engine().store().as_ref(), &filter) {
        Ok(cycles) => success(StatusCode::OK, now, |timestamp| CyclesSuccessResponse {
            cycles,
            timestamp,
        }),
        Err(err) => error_response(&err, now),
    }
}

fn cycle_filter(job_id: JobId, query: &CyclesQuery) -> Result<CycleFilter, String> {
    Ok(CycleFilter::job(job_id)
        .trucks(parse_id_list("trucks", query.trucks.as_deref())?)
        .invoices(parse_id_list("invoices", query.invoices.as_deref())?))
}

fn parse_id_list(name: &str, raw: Option<&str>) -> Result<Vec<u64>, String> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| format!("{name} must be a comma-separated list of ids, got {part:?}"))
        })
        .collect()
}

fn build_loads_response(
    result: Result<usize, AppError>,
    now: OffsetDateTime,
) -> ApiResponse<LoadsSuccessResponse> {
    match result {
        Ok(closed_cycles) => success(StatusCode::OK, now, |timestamp| LoadsSuccessResponse {
            closed_cycles,
            timestamp,
        }),
        Err(err) => error_response(&err, now),
    }
}

fn build_complete_response(
    result: Result<bool, AppError>,
    now: OffsetDateTime,
) -> ApiResponse<CompleteSuccessResponse> {
    match result {
        Ok(complete) => success(StatusCode::OK, now, |timestamp| CompleteSuccessResponse {
            complete,
            timestamp,
        }),
        Err(err) => error_response(&err, now),
    }
}

fn build_cycle_response(
    result: Result<LoadCycle, AppError>,
    now: OffsetDateTime,
) -> ApiResponse<CycleSuccessResponse> {
    match result {
        Ok(cycle) => success(StatusCode::OK, now, |timestamp| CycleSuccessResponse {
            cycle,
            timestamp,
        }),
        Err(err) => error_response(&err, now),
    }
}

fn build_health_response(
    state: &Arc<RwLock<AppState>>,
    workers: usize,
    now: OffsetDateTime,
) -> ApiResponse<HealthSuccessResponse> {
    let ingest = match state.read() {
        Ok(guard) => guard.stats().clone(),
        Err(_) => return internal_error("state lock poisoned while reading ingest stats"),
    };

    // More failing samples than applied ones means the store is not keeping up.
    let status = if ingest.failed > ingest.applied {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };
    success(StatusCode::OK, now, |timestamp| HealthSuccessResponse {
        status,
        workers,
        ingest,
        timestamp,
    })
}

fn success<T>(
    status: StatusCode,
    now: OffsetDateTime,
    body: impl FnOnce(String) -> T,
) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Success {
            status,
            body: body(timestamp),
        },
        Err(err) => internal_error(&err.to_string()),
    }
}

fn error_response<T>(err: &AppError, now: OffsetDateTime) -> ApiResponse<T> {
    let (status, code) = match err {
        AppError::StoreUnavailable(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::StoreUnavailable)
        }
        AppError::Conflict { .. } => (StatusCode::CONFLICT, ErrorCode::Conflict),
        AppError::CycleNotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::CycleNotFound),
        AppError::InvalidAmendment(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, ErrorCode::InvalidAmendment)
        }
        AppError::WorkerStopped { .. } => {
            (StatusCode::SERVICE_UNAVAILABLE, ErrorCode::WorkerUnavailable)
        }
        AppError::Publish(_) | AppError::StateLock => return internal_error(&err.to_string()),
    };
    warn!(error = %err, status = status.as_u16(), "Request failed");
    error_body(status, code, err.to_string(), now)
}

fn error_body<T>(
    status: StatusCode,
    error_code: ErrorCode,
    error_message: String,
    now: OffsetDateTime,
) -> ApiResponse<T> {
    match format_timestamp(now) {
        Ok(timestamp) => ApiResponse::Error {
            status,
            body: ErrorResponse {
                error_code,
                error_message,
                timestamp,
            },
        },
        Err(err) => internal_error(&err.to_string()),
    }
}

fn internal_error<T>(message: &str) -> ApiResponse<T> {
    error!(message = message, "Internal error while handling request");
    let formatted = format_timestamp(OffsetDateTime::now_utc()).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format internal error timestamp");
        "1970-01-01T00:00:00Z".to_string()
    });
    ApiResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: ErrorResponse {
            error_code: ErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: formatted,
        },
    }
}

fn format_timestamp(timestamp: OffsetDateTime) -> Result<String, TimestampError> {
    timestamp.format(&Rfc3339).map_err(TimestampError::Format)
}
