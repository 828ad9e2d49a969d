use crate::dispatch::Dispatcher;
use axum::Router;
use axum::routing::{get, post, put};

pub mod handlers;
pub mod responses;

pub fn router(dispatcher: Dispatcher) -> Router {
    Router::new()
        .route("/api/samples", post(handlers::post_sample))
        .route(
            "/api/jobs/{job_id}/trucks/{truck_id}/assignations/{assignation_id}/manual",
            post(handlers::post_manual_cycle),
        )
        .route(
            "/api/jobs/{job_id}/trucks/{truck_id}/assignations/{assignation_id}/loads",
            get(handlers::get_loads),
        )
        .route("/api/jobs/{job_id}/cycles", get(handlers::get_cycles))
        .route(
            "/api/jobs/{job_id}/trucks/{truck_id}/complete",
            get(handlers::get_complete),
        )
        .route(
            "/api/jobs/{job_id}/trucks/{truck_id}/cycles/{cycle_id}/ticket",
            put(handlers::put_ticket),
        )
        .route(
            "/api/jobs/{job_id}/trucks/{truck_id}/cycles/{cycle_id}/invoice",
            put(handlers::put_invoice),
        )
        .route("/api/health", get(handlers::get_health))
        .with_state(dispatcher)
}
