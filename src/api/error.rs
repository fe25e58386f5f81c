use crate::services::analyzer::AnalysisError;
use crate::services::error::{PipelineFailure, ProcessingError};
use crate::utils::validation::ValidationError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Payload Too Large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),

    #[error(transparent)]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Pipeline(#[from] PipelineFailure),
}

/// Status, public message and error code for a processing error. Internals stay in the logs.
fn describe(error: &ProcessingError) -> (StatusCode, String, Option<&'static str>) {
    match error {
        ProcessingError::Validation(e) => {
            let status = match e {
                ValidationError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            };
            (status, e.to_string(), Some(e.code()))
        }
        ProcessingError::NotFound(_) => (StatusCode::NOT_FOUND, error.to_string(), None),
        ProcessingError::Analysis(e) => {
            let status = match e {
                AnalysisError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
                AnalysisError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
                AnalysisError::Unavailable(_) | AnalysisError::QuotaExceeded(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            };
            tracing::warn!("Analysis error: {}", e);
            (status, e.to_string(), None)
        }
        ProcessingError::Storage(e) => {
            tracing::error!("Storage error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
                None,
            )
        }
        ProcessingError::Persistence(e) => {
            tracing::error!("Persistence error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
                None,
            )
        }
        ProcessingError::Cancelled => (StatusCode::REQUEST_TIMEOUT, error.to_string(), None),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": msg, "kind": "bad_request" }),
            ),
            AppError::PayloadTooLarge(msg) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({ "error": msg, "kind": "validation_error", "code": "FILE_TOO_LARGE" }),
            ),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal Server Error", "kind": "internal" }),
                )
            }
            AppError::Processing(e) => {
                let (status, message, code) = describe(&e);
                (status, error_body(message, e.kind(), code, None))
            }
            AppError::Pipeline(failure) => {
                let (status, message, code) = describe(&failure.error);
                (
                    status,
                    error_body(
                        message,
                        failure.error.kind(),
                        code,
                        Some(failure.stage.as_str()),
                    ),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

fn error_body(
    message: String,
    kind: &str,
    code: Option<&str>,
    stage: Option<&str>,
) -> Value {
    let mut body = json!({
        "error": message,
        "kind": kind,
    });
    if let Some(code) = code {
        body["code"] = json!(code);
    }
    if let Some(stage) = stage {
        body["stage"] = json!(stage);
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::content_store::StorageError;
    use crate::services::file_service::PipelineStage;
    use http_body_util::BodyExt;

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_validation_failure_response() {
        let err = AppError::Pipeline(PipelineFailure {
            stage: PipelineStage::Validated,
            error: ValidationError::UnsupportedType(".exe".into()).into(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["kind"], "validation_error");
        assert_eq!(body["code"], "UNSUPPORTED_TYPE");
        assert_eq!(body["stage"], "validated");
    }

    #[tokio::test]
    async fn test_storage_failure_hides_details() {
        let err = AppError::Processing(ProcessingError::Storage(StorageError::Backend(
            "secret bucket credentials".into(),
        )));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Internal Server Error");
        assert_eq!(body["kind"], "storage_error");
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let response = AppError::Processing(ProcessingError::NotFound("f1".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["kind"], "not_found");
    }
}
