use crate::AppState;
use crate::api::error::AppError;
use crate::models::{FileRecord, Tag};
use crate::services::file_service::FileIntake;
use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
};
use tokio_util::sync::CancellationToken;
use validator::Validate;

use super::types::*;

#[utoipa::path(
    post,
    path = "/api/files/process",
    request_body(content = ProcessFileRequest, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "File processed", body = FileRecord),
        (status = 400, description = "Validation failed"),
        (status = 413, description = "File too large"),
        (status = 503, description = "Remote analysis unavailable and fallback disabled")
    ),
    tag = "files"
)]
pub async fn process_file(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<FileRecord>, AppError> {
    let mut upload: Option<(String, bytes::Bytes)> = None;
    let mut project_ref = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, "multipart body"))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if name == "file" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| multipart_error(e, "file field"))?;
            upload = Some((filename, data));
        } else if name == "project_ref" {
            project_ref = field
                .text()
                .await
                .map_err(|e| multipart_error(e, "project_ref field"))?
                .trim()
                .to_string();
        }
    }

    let (filename, data) = upload.ok_or(AppError::BadRequest("No file provided".to_string()))?;
    let intake = FileIntake::new(data, filename, project_ref);

    // The pipeline runs in its own task so a client disconnect cancels it instead of
    // dropping it mid-flight; the task then cleans up whatever it stored.
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();
    let service = state.file_service.clone();
    let task =
        tokio::spawn(async move { service.process_file_with_cancel(intake, cancel).await });

    let result = task
        .await
        .map_err(|e| AppError::Internal(format!("pipeline task failed: {}", e)))?;
    let _ = guard.disarm();

    Ok(Json(result?))
}

/// Body-limit breaches become 413, anything else a 400 naming the part that failed.
fn multipart_error(e: MultipartError, part: &str) -> AppError {
    let err_msg = e.to_string();
    if err_msg.contains("length limit exceeded") {
        AppError::PayloadTooLarge("Request body exceeds the maximum allowed limit".to_string())
    } else {
        AppError::BadRequest(format!("Invalid {}: {}", part, err_msg))
    }
}

#[utoipa::path(
    get,
    path = "/api/files",
    params(ListFilesQuery),
    responses(
        (status = 200, description = "Processed files, newest first", body = FileListResponse)
    ),
    tag = "files"
)]
pub async fn list_files(
    State(state): State<AppState>,
    Query(query): Query<ListFilesQuery>,
) -> Result<Json<FileListResponse>, AppError> {
    let category = query.category.as_deref().filter(|c| !c.is_empty());
    let files = state.file_service.list_files(category).await?;
    Ok(Json(FileListResponse {
        total: files.len(),
        files,
    }))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "File metadata with tags", body = FileRecord),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn get_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, AppError> {
    Ok(Json(state.file_service.get_file(&id).await?))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/tags",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "Tags of the file", body = Vec<Tag>),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn get_tags(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Tag>>, AppError> {
    Ok(Json(state.file_service.get_tags(&id).await?))
}

#[utoipa::path(
    put,
    path = "/api/files/{id}/tags",
    params(("id" = String, Path, description = "File ID")),
    request_body = UpdateTagsRequest,
    responses(
        (status = 200, description = "Manual tags replaced", body = FileRecord),
        (status = 400, description = "Invalid tag list"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn update_tags(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTagsRequest>,
) -> Result<Json<FileRecord>, AppError> {
    req.validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

    Ok(Json(state.file_service.update_tags(&id, req.tags).await?))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/content",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 200, description = "Stored bytes"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn get_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (file, bytes) = state.file_service.read_content(&id).await?;
    Ok((
        [
            (header::CONTENT_TYPE, file.file_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file.filename.replace('"', "")),
            ),
        ],
        bytes,
    ))
}

#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    params(("id" = String, Path, description = "File ID")),
    responses(
        (status = 204, description = "File, tags and stored bytes deleted"),
        (status = 404, description = "File not found")
    ),
    tag = "files"
)]
pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.file_service.delete_file(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
