use crate::models::{FileRecord, ProcessedFile, SearchHit, Statistics};
use crate::services::content_store::{StorageError, with_retry};
use crate::services::error::ProcessingError;

use super::FileService;

impl FileService {
    /// Ranked tag search. See `SearchEngine::search`.
    pub async fn search(
        &self,
        query_tags: &[String],
        min_confidence: f32,
    ) -> Result<Vec<SearchHit>, ProcessingError> {
        Ok(self.search.search(query_tags, min_confidence).await?)
    }

    pub async fn list_files(
        &self,
        category: Option<&str>,
    ) -> Result<Vec<FileRecord>, ProcessingError> {
        Ok(self.repository.list(category).await?)
    }

    pub async fn statistics(&self) -> Result<Statistics, ProcessingError> {
        Ok(self.repository.statistics().await?)
    }

    /// Stored bytes of a file. A delete racing this read surfaces as `NotFound`.
    pub async fn read_content(
        &self,
        id: &str,
    ) -> Result<(ProcessedFile, Vec<u8>), ProcessingError> {
        let record = self.repository.get(id).await?;
        let path = record.file.storage_path.clone();

        match with_retry(self.storage_backoff, "retrieve", || self.store.retrieve(&path)).await {
            Ok(bytes) => Ok((record.file, bytes)),
            Err(StorageError::NotFound(_)) => Err(ProcessingError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
