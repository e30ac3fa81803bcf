//! Core types and abstractions for the goalpath metrics engine.
//!
//! This crate provides the metric definitions, snapshot value types, the
//! persistence contract and error handling used across all goalpath crates.

pub mod config;
pub mod definition;
pub mod error;
pub mod time;
pub mod traits;
pub mod types;

pub use config::{MetricsConfig, RecordingSettings, RetrySettings, StorageBackend, StorageSettings};
pub use definition::*;
pub use error::{MetricsError, Result};
pub use time::{Clock, DurationAccuracy, DurationUnit, ManualClock, SystemClock, TimeAccuracy};
pub use traits::*;
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::MetricsConfig;
    pub use crate::definition::*;
    pub use crate::error::{MetricsError, Result};
    pub use crate::time::{Clock, ManualClock, SystemClock, TimeAccuracy};
    pub use crate::traits::*;
    pub use crate::types::*;
}
