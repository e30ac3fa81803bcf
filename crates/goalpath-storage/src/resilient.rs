//! Storage wrapper with automatic retries for transient failures.

use super::retry::{retry_with_backoff, RetryConfig};
use super::{Storage, WriteOp};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage wrapper with automatic retry on failures
pub struct ResilientStorage {
    inner: Arc<dyn Storage>,
    read_config: RetryConfig,
    write_config: RetryConfig,
}

impl ResilientStorage {
    /// Wrap `inner`, using `config` for writes and a short policy for reads.
    pub fn new(inner: Arc<dyn Storage>, config: RetryConfig) -> Self {
        Self {
            inner,
            read_config: RetryConfig::aggressive(),
            write_config: config,
        }
    }
}

#[async_trait]
impl Storage for ResilientStorage {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        retry_with_backoff(self.read_config.clone(), "storage_get", || self.inner.get(key)).await
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        retry_with_backoff(self.write_config.clone(), "storage_put", || self.inner.put(key, value)).await
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        retry_with_backoff(self.write_config.clone(), "storage_delete", || self.inner.delete(key)).await
    }

    async fn exists(&self, key: &[u8]) -> Result<bool> {
        retry_with_backoff(self.read_config.clone(), "storage_exists", || self.inner.exists(key)).await
    }

    async fn get_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        retry_with_backoff(self.read_config.clone(), "storage_get_keys_with_prefix", || {
            self.inner.get_keys_with_prefix(prefix)
        })
        .await
    }

    async fn batch_write(&self, operations: Vec<WriteOp>) -> Result<()> {
        retry_with_backoff(self.write_config.clone(), "storage_batch_write", || {
            self.inner.batch_write(operations.clone())
        })
        .await
    }
}
