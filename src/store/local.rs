//! Filesystem-backed store for development and tests

use super::ArtifactStore;
use crate::artifact::{ObjectKey, StoredObject};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Stores objects as flat files in one directory
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
    public_base: String,
}

impl LocalStore {
    /// Open (creating if needed) a store rooted at `root`, serving objects
    /// under `public_base`.
    pub fn open(root: impl Into<PathBuf>, public_base: impl Into<String>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)
            .map_err(|e| Error::Store(format!("Failed to create {}: {e}", root.display())))?;
        Ok(Self {
            root,
            public_base: public_base.into(),
        })
    }

    /// Filesystem path of the object with `key`
    pub fn object_path(&self, key: &ObjectKey) -> PathBuf {
        self.root.join(key.as_str())
    }

    /// Whether an object with `key` has been stored
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.object_path(key).is_file()
    }

    /// Number of stored objects
    pub fn len(&self) -> usize {
        std::fs::read_dir(&self.root)
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }

    /// Whether the store holds no objects
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn put(&self, local_path: &Path, key: &ObjectKey) -> Result<StoredObject> {
        let target = self.object_path(key);
        tokio::fs::copy(local_path, &target).await.map_err(|e| {
            Error::Store(format!(
                "Failed to store {} as {}: {e}",
                local_path.display(),
                key
            ))
        })?;

        Ok(StoredObject {
            key: key.to_string(),
            public_url: self.public_url_for(key),
        })
    }

    fn public_url_for(&self, key: &ObjectKey) -> String {
        format!("{}/{}", self.public_base.trim_end_matches('/'), key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactId;

    #[tokio::test]
    async fn put_overwrites_existing_objects() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path().join("bucket"), "https://cdn.test/").unwrap();
        let key = ObjectKey::preview(&ArtifactId::allocate());

        let source = tmp.path().join("source.png");
        std::fs::write(&source, b"first").unwrap();
        let stored = store.put(&source, &key).await.unwrap();
        assert_eq!(stored.public_url, format!("https://cdn.test/{key}"));

        std::fs::write(&source, b"second").unwrap();
        store.put(&source, &key).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(std::fs::read(store.object_path(&key)).unwrap(), b"second");
    }

    #[tokio::test]
    async fn missing_source_is_a_store_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = LocalStore::open(tmp.path(), "http://localhost").unwrap();
        let key = ObjectKey::real(&ArtifactId::allocate());

        let result = store.put(&tmp.path().join("missing.png"), &key).await;
        assert!(matches!(result, Err(Error::Store(_))));
        assert!(!store.contains(&key));
    }
}
