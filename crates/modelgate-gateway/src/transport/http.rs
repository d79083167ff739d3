//! Admission HTTP handlers.
//!
//! Thin wrappers over the engine call contracts. Business refusals are 200
//! with `success: false`; only malformed input maps to an error status.

use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use modelgate_core::error::{ClientCode, GateError};
use modelgate_core::model::RoutingRequest;

use crate::app_state::AppState;

/// `GateError` rendered as `{code, msg}` with a matching status.
pub struct ApiError(pub GateError);

impl From<GateError> for ApiError {
    fn from(e: GateError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.client_code();
        let status = match code {
            ClientCode::BadRequest => StatusCode::BAD_REQUEST,
            ClientCode::NotFound => StatusCode::NOT_FOUND,
            ClientCode::Config | ClientCode::UnsupportedVersion | ClientCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(json!({ "code": code.as_str(), "msg": self.0.to_string() })),
        )
            .into_response()
    }
}

fn reject(state: &AppState, e: JsonRejection) -> ApiError {
    let err = GateError::BadRequest(e.body_text());
    state
        .metrics()
        .http_errors
        .inc(&[("code", err.client_code().as_str())]);
    ApiError(err)
}

pub async fn select_route(
    State(state): State<AppState>,
    body: Result<Json<RoutingRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = body.map_err(|e| reject(&state, e))?;
    if req.principal.trim().is_empty() {
        state.metrics().http_errors.inc(&[("code", "BAD_REQUEST")]);
        return Err(GateError::BadRequest("principal must not be empty".into()).into());
    }

    let started = Instant::now();
    let result = state.router().select_route(&req).await;

    let metrics = state.metrics();
    let outcome = if result.success { "selected" } else { "refused" };
    metrics.route_requests.inc(&[("outcome", outcome)]);
    metrics.route_duration.observe(&[], started.elapsed());

    Ok((StatusCode::OK, Json(result)).into_response())
}

#[derive(Serialize)]
struct ReleaseResponse {
    released: bool,
}

pub async fn release_reservation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let released = state.quota().release(&id);
    let outcome = if released { "released" } else { "unknown" };
    state
        .metrics()
        .reservation_releases
        .inc(&[("outcome", outcome)]);
    Json(ReleaseResponse { released })
}

#[derive(Serialize)]
struct QuotaResponse {
    principal: String,
    resource: String,
    tokens: f64,
}

pub async fn check_quota(
    State(state): State<AppState>,
    Path((principal, resource)): Path<(String, String)>,
) -> impl IntoResponse {
    let tokens = state.quota().peek(&principal, &resource);
    Json(QuotaResponse {
        principal,
        resource,
        tokens,
    })
}
