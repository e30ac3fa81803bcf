//! Storage backends and the key-value implementation of the metrics store.

pub mod factory;
pub mod file_storage;
pub mod memory_storage;
pub mod metrics_store;
pub mod resilient;
pub mod retry;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use factory::{create_storage, StorageConfig};
pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;
pub use metrics_store::KvMetricsStore;
pub use resilient::ResilientStorage;
pub use retry::{retry_with_backoff, RetryConfig};

/// Key-value storage backend.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get a value by key
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Put a key-value pair
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Delete a key
    async fn delete(&self, key: &[u8]) -> Result<()>;

    /// Check if key exists
    async fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Get all keys with a prefix, in ascending key order
    async fn get_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>>;

    /// Apply all operations or none of them
    async fn batch_write(&self, operations: Vec<WriteOp>) -> Result<()>;
}

/// Write operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl WriteOp {
    pub fn put(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        WriteOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        WriteOp::Delete { key: key.into() }
    }
}

/// Helper functions for serialization
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub fn deserialize<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(data)?)
}
