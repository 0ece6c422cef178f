use crate::error::{TrainingError, TrainingResult};
use chrono::{DateTime, Utc};
use quicktrain_abstraction::{ObjectStore, UploadOptions};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Prefix all published models live under.
pub const MODELS_PREFIX: &str = "models";

/// Remote key for a job's model: `models/<model_type>_<job_id>.<ext>`.
#[must_use]
pub fn artifact_key(model_type: &str, job_id: &str, extension: &str) -> String {
    format!("{MODELS_PREFIX}/{model_type}_{job_id}.{}", extension.trim_start_matches('.'))
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// A model that reached the object store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedArtifact {
    pub key: String,
    pub sha256: String,
    pub size_bytes: u64,
    /// Present when a signed URL was requested and issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signed_url: Option<String>,
    pub published_at: DateTime<Utc>,
}

/// Uploads trained models under their deterministic keys.
#[derive(Clone)]
pub struct ArtifactPublisher {
    store: Arc<dyn ObjectStore>,
    signed_url_ttl: Option<Duration>,
}

impl std::fmt::Debug for ArtifactPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactPublisher")
            .field("store", &self.store.name())
            .field("signed_url_ttl", &self.signed_url_ttl)
            .finish()
    }
}

impl ArtifactPublisher {
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, signed_url_ttl: Option<Duration>) -> Self {
        Self { store, signed_url_ttl }
    }

    /// Uploads `local_path` to `models/<model_type>_<job_id>.<ext>`, replacing any
    /// previous object, where `<ext>` is the local file's extension.
    ///
    /// A failed upload fails the job. A failed signed-URL request only drops the URL;
    /// the key stays retrievable.
    pub async fn publish(
        &self,
        local_path: &Path,
        job_id: &str,
        model_type: &str,
    ) -> TrainingResult<PublishedArtifact> {
        let extension = local_path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bin".to_string());
        let key = artifact_key(model_type, job_id, &extension);

        let bytes = tokio::fs::read(local_path).await?;
        let sha256 = sha256_bytes(&bytes);
        let size_bytes = bytes.len() as u64;

        self.store
            .upload(&key, bytes, &UploadOptions::upsert())
            .await
            .map_err(|source| TrainingError::Publish { key: key.clone(), source })?;

        let signed_url = match self.signed_url_ttl {
            Some(ttl) => match self.store.signed_url(&key, ttl).await {
                Ok(url) => Some(url.url),
                Err(e) => {
                    warn!(key = %key, error = %e, "Could not issue signed URL");
                    None
                }
            },
            None => None,
        };

        info!(key = %key, size_bytes, sha256 = %sha256, "Published model artifact");
        Ok(PublishedArtifact { key, sha256, size_bytes, signed_url, published_at: Utc::now() })
    }
}
