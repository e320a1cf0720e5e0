//! Artifact storage
//!
//! The [`ArtifactStore`] trait is the seam over object storage. Keys are
//! always derived with [`ObjectKey`], and public URLs are a pure function of
//! the key so the real asset URL can be produced later without a lookup.

mod local;
mod supabase;

pub use local::LocalStore;
pub use supabase::SupabaseStore;

use crate::artifact::{ObjectKey, StoredObject};
use crate::config::{StorageBackend, StorageOptions};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Object storage with upsert semantics and predictable public URLs.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload the file at `local_path` under `key`, replacing any previous
    /// object with that key.
    async fn put(&self, local_path: &Path, key: &ObjectKey) -> Result<StoredObject>;

    /// Public URL an object with `key` is (or would be) served from.
    ///
    /// Performs no I/O and does not check that the object exists.
    fn public_url_for(&self, key: &ObjectKey) -> String;
}

/// Build the configured storage backend.
pub fn from_options(options: &StorageOptions) -> Result<Arc<dyn ArtifactStore>> {
    match options.backend {
        StorageBackend::Supabase => {
            let url = options
                .url
                .as_deref()
                .ok_or_else(|| Error::Config("SUPABASE_URL is not set".to_string()))?;
            let key = options
                .key
                .as_deref()
                .ok_or_else(|| Error::Config("SUPABASE_KEY is not set".to_string()))?;
            Ok(Arc::new(SupabaseStore::new(url, key, &options.bucket)?))
        }
        StorageBackend::Local => {
            let public_base = options
                .url
                .clone()
                .unwrap_or_else(|| format!("file://{}", options.local_dir.display()));
            Ok(Arc::new(LocalStore::open(&options.local_dir, public_base)?))
        }
    }
}
