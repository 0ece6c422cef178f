//! Store factory for creating object store instances from configuration.

use crate::{LocalObjectStore, SupabaseObjectStore};
use quicktrain_abstraction::{ObjectStore, StorageError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Store type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// Directory on disk.
    Local,
    /// Supabase Storage.
    Supabase,
}

impl FromStr for StoreKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "fs" | "filesystem" => Ok(Self::Local),
            "supabase" => Ok(Self::Supabase),
            other => Err(StorageError::Other(format!("unknown store kind: {other}"))),
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Which implementation to build.
    pub kind: StoreKind,
    /// Bucket directory for `Local`.
    pub root: PathBuf,
    /// Project URL for `Supabase`.
    pub url: Option<String>,
    /// Service-role key for `Supabase`.
    pub service_key: Option<String>,
    /// Bucket name for `Supabase`.
    pub bucket: String,
}

/// Factory for creating store instances.
pub struct StoreFactory;

impl StoreFactory {
    /// Creates a store from the given configuration.
    ///
    /// # Errors
    /// Returns `StorageError::Other` if a Supabase store is requested without URL or key.
    pub fn create(config: &StoreConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
        debug!(kind = ?config.kind, bucket = %config.bucket, "Creating object store");

        match config.kind {
            StoreKind::Local => Ok(Arc::new(LocalObjectStore::new(config.root.clone()))),
            StoreKind::Supabase => {
                let url = config
                    .url
                    .clone()
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| StorageError::Other("supabase store requires a URL".to_string()))?;
                let key = config
                    .service_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
                    .ok_or_else(|| {
                        StorageError::Other("supabase store requires a service key".to_string())
                    })?;
                Ok(Arc::new(SupabaseObjectStore::new(url, key, config.bucket.clone())))
            }
        }
    }
}
