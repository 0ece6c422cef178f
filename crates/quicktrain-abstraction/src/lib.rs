//! Object store abstraction layer for QuickTrain.
//!
//! This module defines the contract every storage backend implements: download a
//! named object, upload one (optionally overwriting), and issue a time-limited
//! retrieval URL. All keys are relative to a single logical bucket.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Represents an error that can occur when talking to an object store.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageError {
    /// The requested object does not exist.
    #[error("Object not found: {0}")]
    NotFound(String),

    /// The object exists and the upload did not ask for upsert semantics.
    #[error("Object already exists: {0}")]
    Conflict(String),

    /// The key is empty or would escape the bucket.
    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A transport-level failure (network, local I/O).
    #[error("Request Error: {0}")]
    RequestError(String),

    /// The store answered with an unexpected status or payload.
    #[error("Store Response Error: {0}")]
    ResponseError(String),

    /// Other unexpected errors.
    #[error("Other Storage Error: {0}")]
    Other(String),
}

/// Result type for object store operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Options for an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Overwrite the object if it already exists.
    pub upsert: bool,
    /// MIME type recorded with the object.
    pub content_type: String,
}

impl UploadOptions {
    /// Upload that replaces any existing object under the same key.
    #[must_use]
    pub fn upsert() -> Self {
        Self { upsert: true, ..Self::default() }
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self { upsert: false, content_type: "application/octet-stream".to_string() }
    }
}

/// A time-limited retrieval URL for an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrl {
    /// The URL itself.
    pub url: String,
    /// When the URL stops working.
    pub expires_at: DateTime<Utc>,
}

/// A remote object store scoped to one bucket.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Human-readable identifier for logs (e.g. "local", "supabase").
    fn name(&self) -> &str;

    /// Downloads the full contents of an object.
    async fn download(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Uploads an object. Without `upsert`, an existing object yields `Conflict`.
    async fn upload(&self, key: &str, bytes: Vec<u8>, options: &UploadOptions) -> StorageResult<()>;

    /// Issues a retrieval URL valid for `ttl`.
    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl>;
}

/// Checks that `key` is a relative, bucket-confined object key.
///
/// Rejects empty keys, absolute keys, backslashes, and empty / `.` / `..` segments.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let reject = |reason: &str| {
        Err(StorageError::InvalidKey { key: key.to_string(), reason: reason.to_string() })
    };

    if key.trim().is_empty() {
        return reject("key is empty");
    }
    if key.starts_with('/') {
        return reject("key must be relative to the bucket");
    }
    if key.contains('\\') {
        return reject("backslashes are not allowed");
    }
    for segment in key.split('/') {
        match segment {
            "" => return reject("empty path segment"),
            "." | ".." => return reject("relative path segment"),
            _ => {}
        }
    }
    Ok(())
}

/// Returns the last path segment of an object key.
#[must_use]
pub fn key_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
