pub mod local;
pub mod remote;

pub use local::LocalAnalyzer;
pub use remote::{GoogleVisionProvider, RemoteAnalyzer, VisionProvider};

use crate::models::{RawLabel, TagSource};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AnalysisError {
    #[error("analysis provider unavailable: {0}")]
    Unavailable(String),

    #[error("analysis quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("analysis rejected the input: {0}")]
    InvalidInput(String),

    #[error("malformed analysis response: {0}")]
    MalformedResponse(String),
}

/// Produces raw label/confidence pairs from file content.
///
/// Implementations must only return confidences in `[0, 1]`.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Source recorded on every tag derived from this analyzer's labels.
    fn source(&self) -> TagSource;

    async fn analyze(&self, data: Bytes, file_type: &str) -> Result<Vec<RawLabel>, AnalysisError>;
}

/// Drops non-finite scores and clamps the rest into `[0, 1]`.
pub(crate) fn sanitize_labels(labels: Vec<RawLabel>) -> Vec<RawLabel> {
    labels
        .into_iter()
        .filter(|l| l.confidence.is_finite())
        .map(|l| RawLabel {
            confidence: l.confidence.clamp(0.0, 1.0),
            ..l
        })
        .collect()
}
