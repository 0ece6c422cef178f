//! Supabase Storage implementation.
//!
//! Talks to the Storage REST API (`/storage/v1/object/...`) with a service-role key.

use async_trait::async_trait;
use chrono::Utc;
use quicktrain_abstraction::{
    validate_key, ObjectStore, SignedUrl, StorageError, StorageResult, UploadOptions,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

/// Supabase Storage bucket client.
#[derive(Debug, Clone)]
pub struct SupabaseObjectStore {
    /// Project URL, e.g. `https://xyz.supabase.co`.
    base_url: String,
    /// Service-role key used for both `apikey` and bearer auth.
    service_key: String,
    /// Bucket all keys are relative to.
    bucket: String,
    /// HTTP client for making requests.
    client: Client,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest {
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

impl SupabaseObjectStore {
    /// Creates a new client for `bucket` in the project at `base_url`.
    ///
    /// # Arguments
    /// * `base_url` - Project URL (trailing slashes are ignored)
    /// * `service_key` - Service-role key
    /// * `bucket` - Bucket name
    #[must_use]
    pub fn new(base_url: String, service_key: String, bucket: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
            client: Client::new(),
        }
    }

    /// The bucket this client is scoped to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, encode_key(key))
    }

    fn sign_url(&self, key: &str) -> String {
        format!("{}/storage/v1/object/sign/{}/{}", self.base_url, self.bucket, encode_key(key))
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.service_key).header("apikey", &self.service_key)
    }
}

/// Percent-encodes each path segment of a key, keeping the `/` separators.
fn encode_key(key: &str) -> String {
    key.split('/').map(|segment| urlencoding::encode(segment).into_owned()).collect::<Vec<_>>().join("/")
}

/// Maps a non-success response to a `StorageError`.
///
/// Supabase reports some 404/409 conditions as HTTP 400 with the real code in the body.
fn status_error(key: &str, status: StatusCode, body: &str) -> StorageError {
    let lowered = body.to_lowercase();
    if status == StatusCode::NOT_FOUND || lowered.contains("not found") {
        return StorageError::NotFound(key.to_string());
    }
    if status == StatusCode::CONFLICT
        || lowered.contains("duplicate")
        || lowered.contains("already exists")
    {
        return StorageError::Conflict(key.to_string());
    }
    StorageError::ResponseError(format!("API error ({status}): {body}"))
}

#[async_trait]
impl ObjectStore for SupabaseObjectStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn download(&self, key: &str) -> StorageResult<Vec<u8>> {
        validate_key(key)?;
        debug!(bucket = %self.bucket, key = %key, "Downloading object");

        let response = self.authorized(self.client.get(self.object_url(key))).send().await.map_err(|e| {
            error!(error = %e, key = %key, "Failed to reach Supabase Storage");
            StorageError::RequestError(format!("Network error: {e}"))
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(key, status, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::RequestError(format!("Failed to read body: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn upload(&self, key: &str, bytes: Vec<u8>, options: &UploadOptions) -> StorageResult<()> {
        validate_key(key)?;
        debug!(
            bucket = %self.bucket,
            key = %key,
            size = bytes.len(),
            upsert = options.upsert,
            "Uploading object"
        );

        let response = self
            .authorized(self.client.post(self.object_url(key)))
            .header("x-upsert", if options.upsert { "true" } else { "false" })
            .header(reqwest::header::CONTENT_TYPE, options.content_type.as_str())
            .body(bytes)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, key = %key, "Failed to reach Supabase Storage");
                StorageError::RequestError(format!("Network error: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            error!(status = %status, key = %key, error = %body, "Upload rejected");
            return Err(status_error(key, status, &body));
        }
        Ok(())
    }

    async fn signed_url(&self, key: &str, ttl: Duration) -> StorageResult<SignedUrl> {
        validate_key(key)?;

        let response = self
            .authorized(self.client.post(self.sign_url(key)))
            .json(&SignRequest { expires_in: ttl.as_secs() })
            .send()
            .await
            .map_err(|e| StorageError::RequestError(format!("Network error: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(key, status, &body));
        }

        let signed: SignResponse = response
            .json()
            .await
            .map_err(|e| StorageError::ResponseError(format!("Failed to parse sign response: {e}")))?;

        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Other(format!("invalid ttl: {e}")))?;

        // The API returns a path relative to `/storage/v1`.
        let url = if signed.signed_url.starts_with("http") {
            signed.signed_url
        } else {
            format!("{}/storage/v1{}", self.base_url, signed.signed_url)
        };

        Ok(SignedUrl { url, expires_at: Utc::now() + ttl })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_for(server: &mockito::ServerGuard) -> SupabaseObjectStore {
        SupabaseObjectStore::new(
            format!("{}/", server.url()),
            "service-key".to_string(),
            "images-bucket".to_string(),
        )
    }

    #[test]
    fn test_encode_key_keeps_separators() {
        assert_eq!(encode_key("models/ebm_j1.pkl"), "models/ebm_j1.pkl");
        assert_eq!(encode_key("user uploads/a b.zip"), "user%20uploads/a%20b.zip");
    }

    #[test]
    fn test_status_error_mapping() {
        assert_eq!(
            status_error("k", StatusCode::NOT_FOUND, ""),
            StorageError::NotFound("k".to_string())
        );
        assert_eq!(
            status_error("k", StatusCode::BAD_REQUEST, r#"{"statusCode":"409","error":"Duplicate"}"#),
            StorageError::Conflict("k".to_string())
        );
        assert!(matches!(
            status_error("k", StatusCode::INTERNAL_SERVER_ERROR, "boom"),
            StorageError::ResponseError(_)
        ));
    }

    #[tokio::test]
    async fn test_download_sends_auth_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/storage/v1/object/images-bucket/a.zip")
            .match_header("authorization", "Bearer service-key")
            .match_header("apikey", "service-key")
            .with_status(200)
            .with_body("PK-bytes")
            .create_async()
            .await;

        let store = store_for(&server);
        let bytes = store.download("a.zip").await.unwrap();
        assert_eq!(bytes, b"PK-bytes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_download_missing_object() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/storage/v1/object/images-bucket/missing.zip")
            .with_status(400)
            .with_body(r#"{"statusCode":"404","error":"not_found","message":"Object not found"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let err = store.download("missing.zip").await.unwrap_err();
        assert_eq!(err, StorageError::NotFound("missing.zip".to_string()));
    }

    #[tokio::test]
    async fn test_upload_with_upsert_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/storage/v1/object/images-bucket/models/ebm_j1.pkl")
            .match_header("x-upsert", "true")
            .match_header("content-type", "application/octet-stream")
            .match_body("model")
            .with_status(200)
            .with_body(r#"{"Key":"images-bucket/models/ebm_j1.pkl"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        store.upload("models/ebm_j1.pkl", b"model".to_vec(), &UploadOptions::upsert()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_conflict_without_upsert() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/storage/v1/object/images-bucket/a.csv")
            .match_header("x-upsert", "false")
            .with_status(409)
            .with_body(r#"{"error":"Duplicate","message":"The resource already exists"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let err = store.upload("a.csv", b"x".to_vec(), &UploadOptions::default()).await.unwrap_err();
        assert_eq!(err, StorageError::Conflict("a.csv".to_string()));
    }

    #[tokio::test]
    async fn test_signed_url_is_absolute() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/storage/v1/object/sign/images-bucket/models/resnet_j2.pth")
            .match_body(mockito::Matcher::Json(serde_json::json!({"expiresIn": 3600})))
            .with_status(200)
            .with_body(r#"{"signedURL":"/object/sign/images-bucket/models/resnet_j2.pth?token=abc"}"#)
            .create_async()
            .await;

        let store = store_for(&server);
        let signed = store.signed_url("models/resnet_j2.pth", Duration::from_secs(3600)).await.unwrap();
        assert_eq!(
            signed.url,
            format!("{}/storage/v1/object/sign/images-bucket/models/resnet_j2.pth?token=abc", server.url())
        );
    }
}
