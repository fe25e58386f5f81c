use crate::AppState;
use crate::api::error::AppError;
use crate::models::Statistics;
use axum::{Json, extract::State};
use validator::Validate;

use super::types::*;

#[utoipa::path(
    post,
    path = "/api/files/search",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "Files ranked by relevance", body = SearchResponse),
        (status = 400, description = "No tags given")
    ),
    tag = "search"
)]
pub async fn search_files(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    let min_confidence = req
        .min_confidence
        .unwrap_or(state.file_service.policy().min_tag_confidence);

    let results = state.file_service.search(&req.tags, min_confidence).await?;
    Ok(Json(SearchResponse {
        total: results.len(),
        results,
    }))
}

#[utoipa::path(
    get,
    path = "/api/files/statistics",
    responses(
        (status = 200, description = "File counts and most used tags", body = Statistics)
    ),
    tag = "search"
)]
pub async fn statistics(State(state): State<AppState>) -> Result<Json<Statistics>, AppError> {
    Ok(Json(state.file_service.statistics().await?))
}
