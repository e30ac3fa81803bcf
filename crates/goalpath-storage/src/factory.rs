use super::{FileStorage, MemoryStorage, ResilientStorage, RetryConfig, Storage};
use anyhow::{Context, Result};
use goalpath_core::{MetricsConfig, StorageBackend};
use std::path::PathBuf;
use std::sync::Arc;

/// Storage configuration options
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Storage backend to use
    pub backend: StorageBackend,

    /// Store file for the file backend
    pub path: Option<PathBuf>,

    /// Whether to fall back to in-memory storage if the backend fails to open
    pub fallback_to_memory: bool,

    /// Retry policy for writes; `None` disables the retry wrapper
    pub retry: Option<RetryConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            path: None,
            fallback_to_memory: false,
            retry: None,
        }
    }
}

impl StorageConfig {
    /// Create a new storage configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive storage options from the loaded configuration.
    pub fn from_metrics_config(config: &MetricsConfig) -> goalpath_core::Result<Self> {
        let path = match config.storage.backend {
            StorageBackend::File => Some(config.storage_path()?),
            StorageBackend::Memory => config.storage.path.clone(),
        };
        Ok(Self {
            backend: config.storage.backend,
            path,
            fallback_to_memory: config.storage.fallback_to_memory,
            retry: Some(RetryConfig::from(&config.retry)),
        })
    }

    /// Use a JSON store file
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.backend = StorageBackend::File;
        self.path = Some(path.into());
        self
    }

    /// Enable fallback to in-memory storage
    pub fn with_memory_fallback(mut self) -> Self {
        self.fallback_to_memory = true;
        self
    }

    /// Wrap the backend with retries
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }
}

/// Create a storage backend with automatic fallback
///
/// Opens the configured backend, wraps it in [`ResilientStorage`] when a retry
/// policy is set, and falls back to [`MemoryStorage`] if opening fails and
/// fallback is enabled.
///
/// # Examples
///
/// ```rust,no_run
/// use goalpath_storage::{create_storage, StorageConfig};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = StorageConfig::new()
///     .with_file("/tmp/goalpath/metrics.json")
///     .with_memory_fallback();
/// let storage = create_storage(config).await?;
/// # Ok(())
/// # }
/// ```
pub async fn create_storage(config: StorageConfig) -> Result<Arc<dyn Storage>> {
    let result = match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory storage");
            Ok(Arc::new(MemoryStorage::new()) as Arc<dyn Storage>)
        }
        StorageBackend::File => open_file_storage(config.path.as_ref()).await,
    };

    let storage: Arc<dyn Storage> = match result {
        Ok(storage) => storage,
        Err(e) => {
            tracing::error!(
                path = ?config.path,
                backend = ?config.backend,
                error = %format!("{:#}", e),
                "Failed to open storage backend"
            );

            if !config.fallback_to_memory {
                return Err(e).context("Failed to create storage backend and fallback is disabled");
            }
            tracing::warn!("Falling back to in-memory storage. Metrics will not persist!");
            Arc::new(MemoryStorage::new())
        }
    };

    let storage: Arc<dyn Storage> = match config.retry {
        Some(retry) => Arc::new(ResilientStorage::new(storage, retry)),
        None => storage,
    };
    Ok(storage)
}

async fn open_file_storage(path: Option<&PathBuf>) -> Result<Arc<dyn Storage>> {
    let path = path.context("File storage requires a path")?;
    let storage = FileStorage::open(path)
        .await
        .with_context(|| format!("Failed to create file storage at {:?}", path))?;
    tracing::info!(path = ?path, "Successfully opened file storage");
    Ok(Arc::new(storage))
}
