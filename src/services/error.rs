use crate::services::analyzer::AnalysisError;
use crate::services::content_store::StorageError;
use crate::services::file_service::types::PipelineStage;
use crate::services::repository::PersistenceError;
use crate::utils::validation::ValidationError;
use thiserror::Error;

/// Every failure the file service can surface, with a stable `kind`.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),

    #[error(transparent)]
    Persistence(PersistenceError),

    #[error("file {0} not found")]
    NotFound(String),

    #[error("request cancelled")]
    Cancelled,
}

impl ProcessingError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::Validation(_) => "validation_error",
            ProcessingError::Storage(_) => "storage_error",
            ProcessingError::Analysis(_) => "analysis_error",
            ProcessingError::Persistence(_) => "persistence_error",
            ProcessingError::NotFound(_) => "not_found",
            ProcessingError::Cancelled => "cancelled",
        }
    }
}

impl From<PersistenceError> for ProcessingError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::NotFound(id) => ProcessingError::NotFound(id),
            other => ProcessingError::Persistence(other),
        }
    }
}

/// Terminal `Failed` state of a pipeline run: the stage it was trying to reach and why.
#[derive(Debug, Error)]
#[error("pipeline failed at {stage}: {error}")]
pub struct PipelineFailure {
    pub stage: PipelineStage,
    #[source]
    pub error: ProcessingError,
}
