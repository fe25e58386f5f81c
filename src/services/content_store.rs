use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use std::future::Future;
use std::io::Write;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("stored object not found: {0}")]
    NotFound(String),

    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StorageError {
    /// Transient failures are worth one more attempt; the rest never succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_) | StorageError::Backend(_))
    }
}

/// Raw byte persistence. Paths are generated by the store, never derived from user input.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Persist bytes atomically and return the generated storage path.
    async fn store(&self, data: Bytes) -> Result<String, StorageError>;

    async fn retrieve(&self, storage_path: &str) -> Result<Vec<u8>, StorageError>;

    /// Idempotent: deleting a missing object succeeds.
    async fn delete(&self, storage_path: &str) -> Result<(), StorageError>;

    async fn exists(&self, storage_path: &str) -> Result<bool, StorageError>;
}

/// Path format: `{first-2-hex}/{next-2-hex}/{uuid}.bin`
pub fn generate_storage_path(id: &Uuid) -> String {
    let hex = id.simple().to_string();
    format!("{}/{}/{}.bin", &hex[0..2], &hex[2..4], id.as_hyphenated())
}

/// Runs a storage operation, retrying a transient failure once after `backoff`.
pub async fn with_retry<T, F, Fut>(
    backoff: Duration,
    operation: &str,
    mut op: F,
) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    match op().await {
        Err(e) if e.is_transient() => {
            warn!(operation, error = %e, "storage operation failed, retrying once");
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}

/// Content store backed by a local directory.
pub struct LocalContentStore {
    root: PathBuf,
}

impl LocalContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, storage_path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(storage_path);
        let is_clean = !storage_path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_clean {
            warn!("Path traversal attempt detected: {}", storage_path);
            return Err(StorageError::InvalidPath(storage_path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentStore for LocalContentStore {
    async fn store(&self, data: Bytes) -> Result<String, StorageError> {
        let storage_path = generate_storage_path(&Uuid::new_v4());
        let full_path = self.resolve(&storage_path)?;
        debug!(storage_path = %storage_path, size = data.len(), "content_store: write");

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let parent = full_path
                .parent()
                .ok_or_else(|| StorageError::InvalidPath(full_path.display().to_string()))?;
            std::fs::create_dir_all(parent)?;

            // Temp file in the same directory so the final rename stays on one filesystem.
            // A failure before persist drops the temp file, leaving nothing under the final path.
            let mut temp = tempfile::NamedTempFile::new_in(parent)?;
            temp.write_all(&data)?;
            temp.as_file().sync_all()?;
            temp.persist_noclobber(&full_path).map_err(|e| e.error)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                std::fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644))?;
            }
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(format!("write task failed: {}", e)))??;

        Ok(storage_path)
    }

    async fn retrieve(&self, storage_path: &str) -> Result<Vec<u8>, StorageError> {
        let full_path = self.resolve(storage_path)?;
        match tokio::fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(storage_path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, storage_path: &str) -> Result<(), StorageError> {
        let full_path = self.resolve(storage_path)?;
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, storage_path: &str) -> Result<bool, StorageError> {
        let full_path = self.resolve(storage_path)?;
        Ok(tokio::fs::try_exists(full_path).await?)
    }
}

/// Content store backed by an S3-compatible bucket (MinIO in development).
pub struct S3ContentStore {
    client: Client,
    bucket: String,
}

impl S3ContentStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl ContentStore for S3ContentStore {
    async fn store(&self, data: Bytes) -> Result<String, StorageError> {
        let key = generate_storage_path(&Uuid::new_v4());
        // A single PUT is atomic: the object is either fully visible or absent.
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(key)
    }

    async fn retrieve(&self, storage_path: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(storage_path)
            .send()
            .await
            .map_err(|e| {
                if e.as_service_error().is_some_and(|s| s.is_no_such_key()) {
                    StorageError::NotFound(storage_path.to_string())
                } else {
                    StorageError::Backend(e.to_string())
                }
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(data.into_bytes().to_vec())
    }

    async fn delete(&self, storage_path: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(storage_path)
            .send()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn exists(&self, storage_path: &str) -> Result<bool, StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(storage_path)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|s| s.is_not_found()) => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_generate_storage_path() {
        let id = Uuid::parse_str("01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f").unwrap();
        assert_eq!(
            generate_storage_path(&id),
            "01/94/01948f7e-8b2a-7c3d-9e4f-5a6b7c8d9e0f.bin"
        );
    }

    #[tokio::test]
    async fn test_store_retrieve_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path());

        let path = store.store(Bytes::from_static(b"hello world")).await.unwrap();
        assert!(path.ends_with(".bin"));
        assert!(store.exists(&path).await.unwrap());
        assert_eq!(store.retrieve(&path).await.unwrap(), b"hello world");

        store.delete(&path).await.unwrap();
        assert!(!store.exists(&path).await.unwrap());
        assert!(matches!(
            store.retrieve(&path).await,
            Err(StorageError::NotFound(_))
        ));

        // Second delete is a no-op
        store.delete(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_identical_content_gets_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path());

        let a = store.store(Bytes::from_static(b"same")).await.unwrap();
        let b = store.store(Bytes::from_static(b"same")).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path());

        let path = store.store(Bytes::from_static(b"payload")).await.unwrap();
        let parent = dir.path().join(&path);
        let entries: Vec<_> = std::fs::read_dir(parent.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_traversal_paths() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalContentStore::new(dir.path());

        for bad in ["../secret.bin", "/etc/passwd", "", "ab/../../x.bin"] {
            assert!(matches!(
                store.retrieve(bad).await,
                Err(StorageError::InvalidPath(_))
            ));
            assert!(matches!(
                store.delete(bad).await,
                Err(StorageError::InvalidPath(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_with_retry_retries_transient_once() {
        let attempts = AtomicUsize::new(0);
        let result = with_retry(Duration::from_millis(1), "store", || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(StorageError::Backend("flaky".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_gives_up_after_second_failure() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(Duration::from_millis(1), "store", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::Backend("down".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_does_not_retry_not_found() {
        let attempts = AtomicUsize::new(0);
        let result: Result<(), _> = with_retry(Duration::from_millis(1), "retrieve", || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(StorageError::NotFound("x".into())) }
        })
        .await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
