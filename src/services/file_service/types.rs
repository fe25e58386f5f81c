use crate::services::content_store::{ContentStore, with_retry};
use crate::services::error::{PipelineFailure, ProcessingError};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};
use utoipa::ToSchema;

/// One inbound file
#[derive(Debug, Clone)]
pub struct FileIntake {
    pub bytes: Bytes,
    pub filename: String,
    pub project_ref: String,
}

impl FileIntake {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>, project_ref: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            project_ref: project_ref.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStage {
    Received,
    Validated,
    Stored,
    Analyzed,
    Tagged,
    Persisted,
    Completed,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Validated => "validated",
            PipelineStage::Stored => "stored",
            PipelineStage::Analyzed => "analyzed",
            PipelineStage::Tagged => "tagged",
            PipelineStage::Persisted => "persisted",
            PipelineStage::Completed => "completed",
        }
    }

    pub fn next(&self) -> PipelineStage {
        match self {
            PipelineStage::Received => PipelineStage::Validated,
            PipelineStage::Validated => PipelineStage::Stored,
            PipelineStage::Stored => PipelineStage::Analyzed,
            PipelineStage::Analyzed => PipelineStage::Tagged,
            PipelineStage::Tagged => PipelineStage::Persisted,
            PipelineStage::Persisted | PipelineStage::Completed => PipelineStage::Completed,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks the state of a single request through the pipeline.
pub(crate) struct PipelineRun {
    request: String,
    stage: PipelineStage,
}

impl PipelineRun {
    pub(crate) fn new(request: &str) -> Self {
        debug!(request, stage = %PipelineStage::Received, "pipeline: received");
        Self {
            request: request.to_string(),
            stage: PipelineStage::Received,
        }
    }

    pub(crate) fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Move to the next stage.
    pub(crate) fn advance(&mut self) {
        self.stage = self.stage.next();
        debug!(request = %self.request, stage = %self.stage, "pipeline: advanced");
    }

    /// Enter the terminal failed state, recording the stage that could not be reached.
    pub(crate) fn fail(&self, error: impl Into<ProcessingError>) -> PipelineFailure {
        let error = error.into();
        let stage = self.stage.next();
        match &error {
            ProcessingError::Validation(_) | ProcessingError::Cancelled => {
                debug!(request = %self.request, %stage, error = %error, "pipeline: failed")
            }
            _ => warn!(request = %self.request, %stage, error = %error, "pipeline: failed"),
        }
        PipelineFailure { stage, error }
    }
}

/// Bytes that are in the content store but not yet referenced by metadata.
///
/// Must end in `commit` or `compensate`. If dropped while still armed (the request future was
/// abandoned), deletion is scheduled on the current runtime.
pub(crate) struct StoredBytes {
    store: Arc<dyn ContentStore>,
    path: String,
    backoff: Duration,
    armed: bool,
}

impl StoredBytes {
    pub(crate) fn new(store: Arc<dyn ContentStore>, path: String, backoff: Duration) -> Self {
        Self {
            store,
            path,
            backoff,
            armed: true,
        }
    }

    pub(crate) fn path(&self) -> &str {
        &self.path
    }

    /// Metadata now references the bytes.
    pub(crate) fn commit(mut self) {
        self.armed = false;
    }

    /// Compensating delete after a downstream failure.
    pub(crate) async fn compensate(mut self) {
        self.armed = false;
        let store = self.store.clone();
        let path = self.path.clone();
        match with_retry(self.backoff, "compensating delete", || store.delete(&path)).await {
            Ok(()) => warn!(storage_path = %path, "🧹 Removed stored bytes after pipeline failure"),
            Err(e) => error!(storage_path = %path, error = %e, "❌ Compensating delete failed, bytes orphaned"),
        }
    }
}

impl Drop for StoredBytes {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        let path = std::mem::take(&mut self.path);
        let backoff = self.backoff;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(storage_path = %path, "🧹 Request abandoned, scheduling cleanup of stored bytes");
                handle.spawn(async move {
                    if let Err(e) = with_retry(backoff, "abandoned cleanup", || store.delete(&path)).await {
                        error!(storage_path = %path, error = %e, "❌ Cleanup of abandoned upload failed");
                    }
                });
            }
            Err(_) => error!(storage_path = %path, "❌ No runtime to clean up abandoned upload"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::content_store::LocalContentStore;

    #[test]
    fn test_stage_sequence() {
        let mut stage = PipelineStage::Received;
        let mut seen = vec![stage];
        while stage != PipelineStage::Completed {
            stage = stage.next();
            seen.push(stage);
        }
        assert_eq!(
            seen,
            vec![
                PipelineStage::Received,
                PipelineStage::Validated,
                PipelineStage::Stored,
                PipelineStage::Analyzed,
                PipelineStage::Tagged,
                PipelineStage::Persisted,
                PipelineStage::Completed,
            ]
        );
    }

    #[test]
    fn test_fail_records_target_stage() {
        let mut run = PipelineRun::new("test");
        run.advance();
        assert_eq!(run.stage(), PipelineStage::Validated);
        let failure = run.fail(ProcessingError::Cancelled);
        assert_eq!(failure.stage, PipelineStage::Stored);
    }

    #[tokio::test]
    async fn test_commit_keeps_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ContentStore> = Arc::new(LocalContentStore::new(dir.path()));
        let path = store.store(Bytes::from_static(b"keep")).await.unwrap();

        StoredBytes::new(store.clone(), path.clone(), Duration::from_millis(1)).commit();
        tokio::task::yield_now().await;
        assert!(store.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_compensate_removes_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ContentStore> = Arc::new(LocalContentStore::new(dir.path()));
        let path = store.store(Bytes::from_static(b"gone")).await.unwrap();

        StoredBytes::new(store.clone(), path.clone(), Duration::from_millis(1))
            .compensate()
            .await;
        assert!(!store.exists(&path).await.unwrap());
    }

    #[tokio::test]
    async fn test_drop_schedules_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn ContentStore> = Arc::new(LocalContentStore::new(dir.path()));
        let path = store.store(Bytes::from_static(b"abandoned")).await.unwrap();

        drop(StoredBytes::new(store.clone(), path.clone(), Duration::from_millis(1)));

        for _ in 0..100 {
            if !store.exists(&path).await.unwrap() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("abandoned bytes were not cleaned up");
    }
}
