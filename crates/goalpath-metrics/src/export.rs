//! JSON export of recorded snapshots.

use crate::service::MetricService;
use chrono::{DateTime, Utc};
use goalpath_core::{MetricSnapshotExport, MetricsError, Result};
use serde::{Deserialize, Serialize};

/// Snapshots of the public metrics at export time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportDocument {
    pub exported_at: DateTime<Utc>,
    /// Public metric names, in registration order
    pub metrics: Vec<String>,
    /// One flat record per snapshot, in recording order
    pub snapshots: Vec<MetricSnapshotExport>,
}

impl ExportDocument {
    pub async fn collect(service: &MetricService, exported_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            exported_at,
            metrics: service.get_public_metric_names(),
            snapshots: service.export_public_snapshots().await?,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(MetricsError::from)
    }

    /// Snapshot records only, as a JSON array.
    pub fn snapshots_json(&self) -> Result<String> {
        serde_json::to_string(&self.snapshots).map_err(MetricsError::from)
    }
}
