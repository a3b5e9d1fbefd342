//! Object store
//!
//! Content-addressed storage for file bytes referenced from upload manifests
//! and artifact attributes. Keys are the hex SHA-256 digest of the content,
//! so adding the same bytes twice yields the same key.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Key under which `content` is stored
pub fn content_key(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Service trait for storing file content by key
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `content` and returns its key
    async fn add_bytes(&self, content: Vec<u8>) -> Result<String>;

    /// Reads the content of `key`; a missing key is an error
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn size(&self, key: &str) -> Result<u64>;

    async fn contains(&self, key: &str) -> Result<bool>;

    /// All stored keys, sorted
    async fn keys(&self) -> Result<Vec<String>>;

    async fn count(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }
}

/// In-memory implementation of ObjectStore
#[derive(Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<String, Arc<Vec<u8>>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn add_bytes(&self, content: Vec<u8>) -> Result<String> {
        let key = content_key(&content);
        self.objects
            .write()
            .await
            .entry(key.clone())
            .or_insert_with(|| Arc::new(content));
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        match self.objects.read().await.get(key) {
            Some(content) => Ok(content.as_ref().clone()),
            None => bail!("object {} not found", key),
        }
    }

    async fn size(&self, key: &str) -> Result<u64> {
        match self.objects.read().await.get(key) {
            Some(content) => Ok(content.len() as u64),
            None => bail!("object {} not found", key),
        }
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

/// Object store keeping one file per key under a root directory
///
/// Writes go to a temporary file first and are renamed into place, so a
/// reader never sees partial content.
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Opens (and creates if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create object store at {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        if !is_valid_key(key) {
            bail!("invalid object key {:?}", key);
        }
        Ok(self.root.join(key))
    }
}

fn is_valid_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn add_bytes(&self, content: Vec<u8>) -> Result<String> {
        let key = content_key(&content);
        let path = self.object_path(&key)?;

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(key);
        }

        let staging = self
            .root
            .join(format!(".{}.{}.tmp", key, uuid::Uuid::new_v4()));
        tokio::fs::write(&staging, &content)
            .await
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        tokio::fs::rename(&staging, &path)
            .await
            .with_context(|| format!("Failed to move object {} into place", key))?;

        debug!("Stored object {} ({} bytes)", key, content.len());
        Ok(key)
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        tokio::fs::read(&path)
            .await
            .with_context(|| format!("object {} not found", key))
    }

    async fn size(&self, key: &str) -> Result<u64> {
        let path = self.object_path(key)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("object {} not found", key))?;
        Ok(metadata.len())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                if is_valid_key(name) {
                    keys.push(name.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}
