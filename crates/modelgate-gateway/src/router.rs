//! Axum router wiring.
//!
//! Exposes the admission API under `/v1` plus the operational endpoints.

use axum::{
    routing::{get, post},
    Router,
};

use crate::{app_state::AppState, ops, transport};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(ops::healthz))
        .route("/readyz", get(ops::readyz))
        .route("/metrics", get(ops::metrics))
        .route("/v1/route", post(transport::http::select_route))
        .route(
            "/v1/reservations/:id/release",
            post(transport::http::release_reservation),
        )
        .route(
            "/v1/quota/:principal/:resource",
            get(transport::http::check_quota),
        )
        .with_state(state)
}
