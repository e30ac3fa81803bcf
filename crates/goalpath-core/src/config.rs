//! Configuration of the metrics engine.
//!
//! Configuration lives in `~/.goalpath/metrics.toml` unless `GOALPATH_HOME`
//! points somewhere else:
//!
//! ```toml
//! [storage]
//! backend = "file"
//! path = "/var/lib/goalpath/metrics.json"
//! fallback_to_memory = true
//!
//! [recording]
//! enabled = true
//!
//! [retry]
//! max_attempts = 3
//! initial_backoff_ms = 100
//! max_backoff_ms = 10000
//! multiplier = 2.0
//!
//! [[metrics]]
//! name = "taskCount"
//! type = "int"
//! assignment = ["workflow"]
//! record_points = ["taskCompleted"]
//! const_value = 1
//! agg = { operation = "sum", time = "all" }
//! ```
//!
//! When no `[[metrics]]` are configured the built-in catalog is used.

use crate::definition::MetricDefinition;
use crate::error::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Overrides the base directory (`~/.goalpath`)
pub const ENV_HOME: &str = "GOALPATH_HOME";
/// Overrides `storage.backend`
pub const ENV_STORAGE_BACKEND: &str = "GOALPATH_STORAGE_BACKEND";
/// Overrides `recording.enabled`
pub const ENV_RECORDING: &str = "GOALPATH_RECORDING";

const CONFIG_FILE_NAME: &str = "metrics.toml";
const STORE_FILE_NAME: &str = "metrics.json";

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file, rewritten atomically on every write batch
    File,
    /// Process memory only
    Memory,
}

impl std::str::FromStr for StorageBackend {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(MetricsError::config(format!(
                "Invalid storage backend '{}'. Must be one of: file, memory",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,
    /// Store file; defaults to `<base_dir>/metrics.json`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Use memory storage when the configured backend cannot be opened
    pub fallback_to_memory: bool,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: None,
            fallback_to_memory: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Whether record/clear events run metric handlers at all
    pub enabled: bool,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Retry policy for storage operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub storage: StorageSettings,
    pub recording: RecordingSettings,
    pub retry: RetrySettings,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<MetricDefinition>,
}

impl MetricsConfig {
    /// Load configuration from the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub async fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from_path(&path).await
    }

    /// Load configuration from a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated
    pub async fn load_from_path(path: &Path) -> Result<Self> {
        debug!("Loading configuration from: {}", path.display());

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| MetricsError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&content)?;
        config.merge_env_vars()?;
        config.validate()?;

        info!("Configuration loaded successfully from {}", path.display());
        Ok(config)
    }

    /// Load the file at `path` if it exists, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file is invalid
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Self::load_from_path(path).await;
        }
        debug!("No configuration at {}, using defaults", path.display());
        let mut config = Self::default();
        config.merge_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without environment overrides or validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| MetricsError::config(format!("Failed to parse config file: {}", e)))
    }

    /// Save configuration atomically (temp file, then rename).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or cannot be written
    pub async fn save_to_path(&self, path: &Path) -> Result<()> {
        debug!("Saving configuration to: {}", path.display());

        self.validate()?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    MetricsError::config(format!("Failed to create config directory: {}", e))
                })?;
            }
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| MetricsError::config(format!("Failed to serialize config: {}", e)))?;

        let temp_path = path.with_extension("toml.tmp");
        tokio::fs::write(&temp_path, content)
            .await
            .map_err(|e| MetricsError::config(format!("Failed to write config file: {}", e)))?;
        tokio::fs::rename(&temp_path, path)
            .await
            .map_err(|e| MetricsError::config(format!("Failed to rename config file: {}", e)))?;

        info!("Configuration saved successfully to {}", path.display());
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Config`] for bad settings and
    /// [`MetricsError::InvalidDefinition`] for bad metric definitions
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(MetricsError::config("retry.max_attempts must be at least 1"));
        }
        if !(self.retry.multiplier.is_finite() && self.retry.multiplier >= 1.0) {
            return Err(MetricsError::config(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(MetricsError::config(
                "retry.initial_backoff_ms must not exceed retry.max_backoff_ms",
            ));
        }
        if let Some(path) = &self.storage.path {
            if path.as_os_str().is_empty() {
                return Err(MetricsError::config("storage.path must not be empty"));
            }
        }

        let mut names = HashSet::new();
        for definition in &self.metrics {
            definition.validate()?;
            if !names.insert(definition.name.as_str()) {
                return Err(MetricsError::config(format!(
                    "Metric \"{}\" is defined more than once",
                    definition.name
                )));
            }
        }
        Ok(())
    }

    /// Apply `GOALPATH_*` environment overrides.
    pub fn merge_env_vars(&mut self) -> Result<()> {
        self.merge_env_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn merge_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup(ENV_STORAGE_BACKEND) {
            debug!("Overriding storage backend from environment: {}", backend);
            self.storage.backend = backend.parse()?;
        }

        if let Some(recording) = lookup(ENV_RECORDING) {
            debug!("Overriding recording from environment: {}", recording);
            self.recording.enabled = parse_flag(&recording).ok_or_else(|| {
                MetricsError::config(format!("Invalid value for {}: {}", ENV_RECORDING, recording))
            })?;
        }

        Ok(())
    }

    /// Base directory (`~/.goalpath/`), overridable with `GOALPATH_HOME`.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined
    pub fn base_dir() -> Result<PathBuf> {
        if let Ok(home) = std::env::var(ENV_HOME) {
            return Ok(PathBuf::from(home));
        }
        let home = dirs::home_dir()
            .ok_or_else(|| MetricsError::config("Could not determine home directory"))?;
        Ok(home.join(".goalpath"))
    }

    /// Default configuration file path (`~/.goalpath/metrics.toml`).
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Store file path: the configured one or `~/.goalpath/metrics.json`.
    pub fn storage_path(&self) -> Result<PathBuf> {
        match &self.storage.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Self::base_dir()?.join(STORE_FILE_NAME)),
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
