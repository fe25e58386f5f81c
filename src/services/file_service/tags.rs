use crate::models::{FileRecord, RawLabel, Tag};
use crate::services::error::ProcessingError;
use crate::services::repository::manual_tag;
use crate::services::tag_processor;
use tracing::info;

use super::FileService;

/// Confidence given to every label a person assigns
const MANUAL_CONFIDENCE: f32 = 1.0;

impl FileService {
    pub async fn get_file(&self, id: &str) -> Result<FileRecord, ProcessingError> {
        Ok(self.repository.get(id).await?)
    }

    pub async fn get_tags(&self, id: &str) -> Result<Vec<Tag>, ProcessingError> {
        Ok(self.repository.get(id).await?.tags)
    }

    /// Replace the file's manual tags. Labels go through the same normalization, stop list and
    /// cap as analyzer output; analyzer tags are kept alongside.
    pub async fn update_tags(
        &self,
        id: &str,
        labels: Vec<String>,
    ) -> Result<FileRecord, ProcessingError> {
        let raw: Vec<RawLabel> = labels
            .into_iter()
            .map(|label| RawLabel::new(label, MANUAL_CONFIDENCE))
            .collect();

        let tags: Vec<Tag> = tag_processor::process(&raw, &self.policy.tag_policy())
            .into_iter()
            .map(|t| manual_tag(id, t.label, t.confidence))
            .collect();

        let record = self.repository.update_tags(id, &tags).await?;
        info!("🏷️  Updated manual tags for {} ({} tags)", id, tags.len());
        Ok(record)
    }
}
