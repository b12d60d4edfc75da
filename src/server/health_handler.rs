//! `GET /health` → 200 `{status, uptime, workers:{...}}`, or 503 when any
//! worker is unhealthy.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};

use super::ServerState;

pub async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    let report = state.health.report();
    let status = if report.status == "healthy" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
