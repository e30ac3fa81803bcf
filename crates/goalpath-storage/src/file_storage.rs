use super::memory_storage::apply_ops;
use super::{Storage, WriteOp};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Storage persisted as a single JSON object of UTF-8 keys and values.
///
/// Every write rewrites the file through a temp file and a rename, so a killed
/// process leaves either the previous or the new state on disk. The in-memory
/// map only changes after the file was replaced.
pub struct FileStorage {
    path: PathBuf,
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    write_lock: Mutex<()>,
}

impl FileStorage {
    /// Open the store at `path`, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create directory {}", parent.display()))?;
            }
        }

        let data = match tokio::fs::read(&path).await {
            Ok(content) => {
                let raw: BTreeMap<String, String> = serde_json::from_slice(&content)
                    .with_context(|| format!("Failed to parse store file {}", path.display()))?;
                raw.into_iter()
                    .map(|(k, v)| (k.into_bytes(), v.into_bytes()))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Store file {} does not exist yet", path.display());
                BTreeMap::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read store file {}", path.display()));
            }
        };

        info!(path = %path.display(), keys = data.len(), "Opened file storage");
        Ok(Self {
            path,
            data: Arc::new(RwLock::new(data)),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the number of keys in storage
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    async fn commit(&self, operations: Vec<WriteOp>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut next = self.data.read().clone();
        apply_ops(&mut next, operations);
        self.persist(&next).await?;

        *self.data.write() = next;
        Ok(())
    }

    async fn persist(&self, data: &BTreeMap<Vec<u8>, Vec<u8>>) -> Result<()> {
        let mut raw = BTreeMap::new();
        for (key, value) in data {
            let (Ok(key), Ok(value)) = (std::str::from_utf8(key), std::str::from_utf8(value)) else {
                bail!("File storage only supports UTF-8 keys and values");
            };
            raw.insert(key, value);
        }
        let content = serde_json::to_vec(&raw)?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.commit(vec![WriteOp::put(key, value)]).await
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.commit(vec![WriteOp::delete(key)]).await
    }

    async fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    async fn get_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let data = self.data.read();
        Ok(data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }

    async fn batch_write(&self, operations: Vec<WriteOp>) -> Result<()> {
        self.commit(operations).await
    }
}
