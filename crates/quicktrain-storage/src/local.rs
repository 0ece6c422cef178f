//! Filesystem-backed object store.
//!
//! A directory on disk plays the role of the bucket; object keys map to relative
//! paths beneath it. Used for local development and throughout the test suites.

use async_trait::async_trait;
use chrono::Utc;
use quicktrain_abstraction::{
    validate_key, ObjectStore, SignedUrl, StorageError, StorageResult, UploadOptions,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Creates a store whose bucket is `root`. The directory is created lazily on upload.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The bucket directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn io_error(key: &str, err: &std::io::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::RequestError(format!("{key}: {err}"))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.object_path(key)?;
        debug!(key = %key, path = %path.display(), "Reading local object");

        if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        tokio::fs::read(&path).await.map_err(|e| io_error(key, &e))
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, options: &UploadOptions) -> StorageResult<()> {
        let path = self.object_path(key)?;
        debug!(key = %key, size = bytes.len(), upsert = options.upsert, "Writing local object");

        let exists = tokio::fs::try_exists(&path).await.map_err(|e| io_error(key, &e))?;
        if exists && !options.upsert {
            return Err(StorageError::Conflict(key.to_string()));
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| io_error(key, &e))?;
        }

        // Write-then-rename so readers never observe a partial object.
        let tmp = path.with_extension(format!(
            "upload-{}",
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        tokio::fs::write(&tmp, &bytes).await.map_err(|e| io_error(key, &e))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_error(key, &e));
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl> {
        let path = self.object_path(key)?;
        let absolute = tokio::fs::canonicalize(&path).await.map_err(|e| io_error(key, &e))?;

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Other(format!("invalid ttl: {e}")))?;
        let expires_at = Utc::now() + ttl;

        Ok(SignedUrl {
            url: format!("file://{}?expires={}", absolute.display(), expires_at.timestamp()),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_then_download() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());

        store.upload("uploads/a.zip", b"zip bytes".to_vec(), &UploadOptions::default()).await.unwrap();
        let bytes = store.download("uploads/a.zip").await.unwrap();
        assert_eq!(bytes, b"zip bytes");
    }

    #[tokio::test]
    async fn test_download_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());

        let err = store.download("missing.zip").await.unwrap_err();
        assert_eq!(err, StorageError::NotFound("missing.zip".to_string()));
    }

    #[tokio::test]
    async fn test_upload_without_upsert_conflicts() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());

        store.upload("a.csv", b"1".to_vec(), &UploadOptions::default()).await.unwrap();
        let err = store.upload("a.csv", b"2".to_vec(), &UploadOptions::default()).await.unwrap_err();
        assert_eq!(err, StorageError::Conflict("a.csv".to_string()));
    }

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());

        store.upload("models/ebm_j1.pkl", b"first".to_vec(), &UploadOptions::upsert()).await.unwrap();
        store.upload("models/ebm_j1.pkl", b"second".to_vec(), &UploadOptions::upsert()).await.unwrap();
        assert_eq!(store.download("models/ebm_j1.pkl").await.unwrap(), b"second");

        // No temp files left behind next to the object.
        let entries: Vec<_> = std::fs::read_dir(temp.path().join("models")).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path().join("bucket"));

        let err = store.download("../outside").await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey { .. }));
    }

    #[tokio::test]
    async fn test_signed_url_requires_object() {
        let temp = TempDir::new().unwrap();
        let store = LocalObjectStore::new(temp.path());

        assert!(store.signed_url("nope.pth", Duration::from_secs(60)).await.is_err());

        store.upload("models/x.pth", b"w".to_vec(), &UploadOptions::upsert()).await.unwrap();
        let signed = store.signed_url("models/x.pth", Duration::from_secs(3600)).await.unwrap();
        assert!(signed.url.starts_with("file://"));
        assert!(signed.url.contains("x.pth?expires="));
        assert!(signed.expires_at > Utc::now());
    }
}
