use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub analyzer: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = if state.file_service.repository_healthy().await {
        "connected"
    } else {
        "disconnected"
    };

    let analyzer = if state.file_service.remote_analysis_active() {
        "remote"
    } else {
        "local"
    };

    Json(HealthResponse {
        status: "ok".to_string(),
        database: db_status.to_string(),
        analyzer: analyzer.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
