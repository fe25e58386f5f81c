use crate::config::PipelinePolicy;
use crate::services::analyzer::{LocalAnalyzer, RemoteAnalyzer};
use crate::services::content_store::ContentStore;
use crate::services::repository::MetadataRepository;
use crate::services::search::SearchEngine;
use std::sync::Arc;
use std::time::Duration;

pub mod delete;
pub mod intake;
pub mod query;
pub mod tags;
pub mod types;

pub use types::{FileIntake, PipelineStage};

/// Runs the intake pipeline and the read/update/delete operations around it.
pub struct FileService {
    policy: PipelinePolicy,
    store: Arc<dyn ContentStore>,
    repository: Arc<dyn MetadataRepository>,
    remote: Option<Arc<RemoteAnalyzer>>,
    local: LocalAnalyzer,
    search: SearchEngine,
    storage_backoff: Duration,
}

impl FileService {
    pub fn new(
        policy: PipelinePolicy,
        store: Arc<dyn ContentStore>,
        repository: Arc<dyn MetadataRepository>,
        remote: Option<Arc<RemoteAnalyzer>>,
        storage_backoff: Duration,
    ) -> Self {
        Self {
            search: SearchEngine::new(repository.clone()),
            policy,
            store,
            repository,
            remote,
            local: LocalAnalyzer::new(),
            storage_backoff,
        }
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    /// Whether a new image upload would currently go to the remote analyzer
    pub fn remote_analysis_active(&self) -> bool {
        self.policy.vision_enabled && self.remote.as_ref().is_some_and(|r| r.is_available())
    }

    pub async fn repository_healthy(&self) -> bool {
        self.repository.ping().await
    }
}
