//! Retry with exponential backoff for storage operations.

use anyhow::{Context, Result};
use goalpath_core::RetrySettings;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// Retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_millis(settings.max_backoff_ms),
            multiplier: settings.multiplier,
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Short backoff for reads
    pub fn aggressive() -> Self {
        Self {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            multiplier: 1.5,
        }
    }
}

/// Retry a potentially failing operation with exponential backoff
///
/// # Example
/// ```ignore
/// let value = retry_with_backoff(
///     RetryConfig::default(),
///     "storage_get",
///     || async { storage.get(b"last_id/schedule/schedule").await },
/// ).await?;
/// ```
pub async fn retry_with_backoff<F, Fut, T>(
    config: RetryConfig,
    operation_name: &str,
    mut f: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;
    let mut backoff = config.initial_backoff;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(
                        "Operation '{}' succeeded on attempt {}/{}",
                        operation_name, attempt, config.max_attempts
                    );
                }
                return Ok(result);
            }
            Err(e) if attempt >= config.max_attempts => {
                if config.max_attempts > 1 {
                    error!(
                        "Operation '{}' failed after {} attempts: {:#}",
                        operation_name, config.max_attempts, e
                    );
                }
                return Err(e).context(format!("Failed after {} attempts", config.max_attempts));
            }
            Err(e) => {
                warn!(
                    "Operation '{}' failed on attempt {}/{}: {:#} (retrying in {:?})",
                    operation_name, attempt, config.max_attempts, e, backoff
                );

                sleep(backoff).await;

                backoff = Duration::from_secs_f64(
                    (backoff.as_secs_f64() * config.multiplier).min(config.max_backoff.as_secs_f64()),
                );

                attempt += 1;
            }
        }
    }
}
