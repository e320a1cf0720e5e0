//! Supabase Storage backend

use super::ArtifactStore;
use crate::artifact::{ObjectKey, StoredObject};
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::path::Path;

/// Uploads objects to a public Supabase Storage bucket
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    client: Client,
    base_url: String,
    api_key: String,
    bucket: String,
}

impl SupabaseStore {
    /// Create a store for `bucket` on the project at `base_url`.
    pub fn new(base_url: &str, api_key: &str, bucket: &str) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("Failed to build storage client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            bucket: bucket.to_string(),
        })
    }

    fn object_endpoint(&self, key: &ObjectKey) -> String {
        format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key)
    }
}

#[async_trait]
impl ArtifactStore for SupabaseStore {
    async fn put(&self, local_path: &Path, key: &ObjectKey) -> Result<StoredObject> {
        let body = tokio::fs::read(local_path).await.map_err(|e| {
            Error::Store(format!("Failed to read {}: {e}", local_path.display()))
        })?;

        let response = self
            .client
            .post(self.object_endpoint(key))
            .bearer_auth(&self.api_key)
            .header("apikey", &self.api_key)
            .header(CONTENT_TYPE, "image/png")
            .header("x-upsert", "true")
            .body(bytes::Bytes::from(body))
            .send()
            .await
            .map_err(|e| Error::Store(format!("Upload of {key} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Store(format!(
                "Upload of {key} rejected with {status}: {detail}"
            )));
        }

        tracing::debug!(key = %key, "Uploaded object");
        Ok(StoredObject {
            key: key.to_string(),
            public_url: self.public_url_for(key),
        })
    }

    fn public_url_for(&self, key: &ObjectKey) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }
}
