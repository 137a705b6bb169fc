//! Operational endpoints: health, readiness, liveness.

use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

#[utoipa::path(get, path = "/health", tag = "Operations", responses(
    (status = 200, description = "Node is serving traffic", body = HealthResponse)
))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

#[utoipa::path(get, path = "/ready", tag = "Operations", responses(
    (status = 200, description = "Ready to accept traffic")
))]
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

#[utoipa::path(get, path = "/live", tag = "Operations", responses(
    (status = 200, description = "Process is alive")
))]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
