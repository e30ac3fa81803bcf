use super::{Storage, WriteOp};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

/// In-memory storage for tests and for running without a store file.
///
/// Nothing survives the process; `batch_write` applies under one write lock.
#[derive(Clone)]
pub struct MemoryStorage {
    data: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create a new in-memory storage
    pub fn new() -> Self {
        tracing::info!("Creating in-memory metrics storage (non-persistent)");
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Get the number of keys in storage
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Check if storage is empty
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Clear all data
    pub fn clear(&self) {
        self.data.write().clear();
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.data.write().insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.data.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.data.read().contains_key(key))
    }

    async fn get_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let data = self.data.read();
        let keys: Vec<Vec<u8>> = data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        Ok(keys)
    }

    async fn batch_write(&self, operations: Vec<WriteOp>) -> Result<()> {
        let mut data = self.data.write();
        apply_ops(&mut data, operations);
        Ok(())
    }
}

pub(crate) fn apply_ops(data: &mut BTreeMap<Vec<u8>, Vec<u8>>, operations: Vec<WriteOp>) {
    for op in operations {
        match op {
            WriteOp::Put { key, value } => {
                data.insert(key, value);
            }
            WriteOp::Delete { key } => {
                data.remove(&key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_operations() {
        let storage = MemoryStorage::new();

        storage.put(b"snapshot/a", b"1").await.unwrap();
        let value = storage.get(b"snapshot/a").await.unwrap();
        assert_eq!(value, Some(b"1".to_vec()));

        assert!(storage.exists(b"snapshot/a").await.unwrap());
        assert!(!storage.exists(b"snapshot/b").await.unwrap());

        storage.delete(b"snapshot/a").await.unwrap();
        assert!(!storage.exists(b"snapshot/a").await.unwrap());
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_prefix_query_is_ordered() {
        let storage = MemoryStorage::new();

        storage.put(b"start/m\x1f2", b"b").await.unwrap();
        storage.put(b"start/m\x1f1", b"a").await.unwrap();
        storage.put(b"start/mm\x1f1", b"c").await.unwrap();

        let keys = storage.get_keys_with_prefix(b"start/m\x1f").await.unwrap();
        assert_eq!(keys, vec![b"start/m\x1f1".to_vec(), b"start/m\x1f2".to_vec()]);
    }

    #[tokio::test]
    async fn test_batch_write() {
        let storage = MemoryStorage::new();

        let ops = vec![
            WriteOp::put(b"key1".to_vec(), b"value1".to_vec()),
            WriteOp::put(b"key2".to_vec(), b"value2".to_vec()),
            WriteOp::delete(b"key1".to_vec()),
        ];

        storage.batch_write(ops).await.unwrap();

        assert!(!storage.exists(b"key1").await.unwrap());
        assert!(storage.exists(b"key2").await.unwrap());
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let storage = Arc::new(MemoryStorage::new());

        let mut handles = vec![];

        for i in 0..10 {
            let storage_clone = Arc::clone(&storage);
            let handle = tokio::spawn(async move {
                let key = format!("key{}", i);
                let value = format!("value{}", i);
                storage_clone.put(key.as_bytes(), value.as_bytes()).await.unwrap();
            });
            handles.push(handle);
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(storage.len(), 10);
    }
}
