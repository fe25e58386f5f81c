use crate::services::content_store::with_retry;
use crate::services::error::ProcessingError;
use tracing::{error, info};

use super::FileService;

impl FileService {
    /// Remove metadata (file row and tags in one transaction), then the stored bytes.
    pub async fn delete_file(&self, id: &str) -> Result<(), ProcessingError> {
        let file = self.repository.delete(id).await?;

        if let Err(e) = with_retry(self.storage_backoff, "delete", || {
            self.store.delete(&file.storage_path)
        })
        .await
        {
            error!(
                file_id = %id,
                storage_path = %file.storage_path,
                error = %e,
                "❌ Metadata removed but stored bytes could not be deleted"
            );
            return Err(e.into());
        }

        info!("🗑️  Deleted file {} ({})", id, file.filename);
        Ok(())
    }
}
