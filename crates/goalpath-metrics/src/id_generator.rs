//! Identifiers for workflow executions and schedules.

use goalpath_core::{MetricsStore, Result};
use std::sync::Arc;
use tracing::debug;

/// Issues execution and schedule ids backed by the metrics store.
///
/// Ids are persisted, so they keep increasing across restarts and across
/// generators sharing a store.
#[derive(Clone)]
pub struct MetricIdGenerator {
    store: Arc<dyn MetricsStore>,
}

impl std::fmt::Debug for MetricIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricIdGenerator").finish_non_exhaustive()
    }
}

impl MetricIdGenerator {
    pub fn new(store: Arc<dyn MetricsStore>) -> Self {
        Self { store }
    }

    pub async fn get_new_execution_id(&self, workflow_id: &str) -> Result<u64> {
        let id = self.store.get_new_execution_id(workflow_id).await?;
        debug!(workflow_id, execution_id = id, "Issued execution id");
        Ok(id)
    }

    pub async fn get_new_schedule_id(&self) -> Result<u64> {
        let id = self.store.get_new_schedule_id().await?;
        debug!(schedule_id = id, "Issued schedule id");
        Ok(id)
    }
}
