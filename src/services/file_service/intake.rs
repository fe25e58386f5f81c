use crate::models::{FileRecord, ProcessedFile, RawLabel, Tag, TagSource};
use crate::services::analyzer::{Analyzer, RemoteAnalyzer};
use crate::services::content_store::with_retry;
use crate::services::error::{PipelineFailure, ProcessingError};
use crate::services::tag_processor;
use crate::utils::validation::{DetectedType, validate};
use bytes::Bytes;
use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::FileService;
use super::types::{FileIntake, PipelineRun, StoredBytes};

/// Analyzer picked for one request
enum AnalyzerChoice<'a> {
    Remote(&'a RemoteAnalyzer),
    Local,
}

struct AnalysisOutcome {
    labels: Vec<RawLabel>,
    source: TagSource,
    vision_enabled: bool,
}

impl FileService {
    /// Validate, store, analyze, tag and persist one file.
    pub async fn process_file(&self, intake: FileIntake) -> Result<FileRecord, PipelineFailure> {
        self.process_file_with_cancel(intake, CancellationToken::new())
            .await
    }

    /// Same as `process_file`, abandoning the remote call when `cancel` fires.
    /// Bytes stored before cancellation are always removed.
    pub async fn process_file_with_cancel(
        &self,
        intake: FileIntake,
        cancel: CancellationToken,
    ) -> Result<FileRecord, PipelineFailure> {
        let mut run = PipelineRun::new(&intake.filename);

        // 1. Validate (no side effects)
        let detected = validate(&intake.bytes, &intake.filename, &self.policy)
            .map_err(|e| run.fail(e))?;
        run.advance();

        if cancel.is_cancelled() {
            return Err(run.fail(ProcessingError::Cancelled));
        }

        // 2. Store
        let storage_path = with_retry(self.storage_backoff, "store", || {
            self.store.store(intake.bytes.clone())
        })
        .await
        .map_err(|e| run.fail(e))?;
        let stored = StoredBytes::new(self.store.clone(), storage_path, self.storage_backoff);
        run.advance();

        // 3. Analyze
        let outcome = match self.analyze(&intake.bytes, &detected, &cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let failure = run.fail(e);
                stored.compensate().await;
                return Err(failure);
            }
        };
        run.advance();

        // 4. Tag
        let scored = tag_processor::process(&outcome.labels, &self.policy.tag_policy());
        run.advance();

        if cancel.is_cancelled() {
            let failure = run.fail(ProcessingError::Cancelled);
            stored.compensate().await;
            return Err(failure);
        }

        // 5. Persist
        let id = Uuid::new_v4().to_string();
        let processed_at = Utc::now();
        let file = ProcessedFile {
            id: id.clone(),
            filename: intake.filename.clone(),
            storage_path: stored.path().to_string(),
            file_type: detected.mime_type.clone(),
            category: detected.category.as_str().to_string(),
            file_size: intake.bytes.len() as i64,
            checksum: hex::encode(Sha256::digest(&intake.bytes)),
            project_ref: intake.project_ref.clone(),
            vision_enabled: outcome.vision_enabled,
            processed_at,
        };
        let tags: Vec<Tag> = scored
            .into_iter()
            .map(|t| Tag {
                file_id: id.clone(),
                label: t.label,
                confidence: t.confidence,
                source: outcome.source,
                created_at: processed_at,
            })
            .collect();

        if let Err(e) = self.repository.save(&file, &tags).await {
            let failure = run.fail(e);
            stored.compensate().await;
            return Err(failure);
        }
        stored.commit();
        run.advance();
        run.advance();

        info!(
            "✅ Processed {} as {} [{}] with {} tags (vision: {})",
            file.filename,
            file.id,
            file.file_type,
            tags.len(),
            file.vision_enabled
        );

        Ok(FileRecord { file, tags })
    }

    /// Remote only when enabled, available and the content is an image.
    fn choose_analyzer(&self, detected: &DetectedType) -> AnalyzerChoice<'_> {
        match &self.remote {
            Some(remote)
                if self.policy.vision_enabled && detected.is_image() && remote.is_available() =>
            {
                AnalyzerChoice::Remote(remote)
            }
            _ => AnalyzerChoice::Local,
        }
    }

    async fn analyze(
        &self,
        data: &Bytes,
        detected: &DetectedType,
        cancel: &CancellationToken,
    ) -> Result<AnalysisOutcome, ProcessingError> {
        if let Some(remote) = &self.remote {
            if self.policy.vision_enabled && detected.is_image() {
                remote.refresh().await;
            }
        }

        if let AnalyzerChoice::Remote(remote) = self.choose_analyzer(detected) {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProcessingError::Cancelled),
                result = remote.analyze(data.clone(), &detected.mime_type) => result,
            };

            match result {
                Ok(labels) => {
                    return Ok(AnalysisOutcome {
                        labels,
                        source: remote.source(),
                        vision_enabled: true,
                    });
                }
                Err(e) if self.policy.allow_local_fallback => {
                    warn!(
                        provider = remote.provider_name(),
                        error = %e,
                        "⚠️  Remote analysis failed, falling back to local heuristics"
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        let labels = self.local.analyze(data.clone(), &detected.mime_type).await?;
        Ok(AnalysisOutcome {
            labels,
            source: self.local.source(),
            vision_enabled: false,
        })
    }
}
