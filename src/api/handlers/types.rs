use crate::models::{FileRecord, SearchHit};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError};

/// Longest label a client may send
const MAX_LABEL_LEN: usize = 100;

/// Multipart body of `POST /api/files/process`, documented for OpenAPI only
#[derive(Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct ProcessFileRequest {
    #[schema(value_type = String, format = Binary)]
    pub file: Vec<u8>,
    pub project_ref: String,
}

#[derive(Deserialize, IntoParams)]
pub struct ListFilesQuery {
    /// `image` or `document`
    pub category: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct FileListResponse {
    pub files: Vec<FileRecord>,
    pub total: usize,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct UpdateTagsRequest {
    /// Replaces the manual tags; an empty list clears them
    #[validate(
        length(max = 50, message = "At most 50 tags can be assigned at once"),
        custom(function = "validate_label_lengths")
    )]
    pub tags: Vec<String>,
}

#[derive(Deserialize, ToSchema, Validate)]
pub struct SearchRequest {
    #[validate(
        length(min = 1, message = "At least one tag is required"),
        custom(function = "validate_search_tags")
    )]
    pub tags: Vec<String>,
    /// Defaults to the configured minimum tag confidence
    #[validate(range(min = 0.0, max = 1.0, message = "min_confidence must be between 0 and 1"))]
    pub min_confidence: Option<f32>,
}

fn validate_label_lengths(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().any(|t| t.len() > MAX_LABEL_LEN) {
        return Err(ValidationError::new("label_too_long")
            .with_message("Tags must be at most 100 characters".into()));
    }
    Ok(())
}

fn validate_search_tags(tags: &[String]) -> Result<(), ValidationError> {
    if tags.iter().all(|t| t.trim().is_empty()) {
        return Err(ValidationError::new("blank_tags")
            .with_message("At least one tag is required".into()));
    }
    validate_label_lengths(tags)
}

#[derive(Serialize, ToSchema)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total: usize,
}
