//! Core traits shared across the goalpath crates.

use crate::error::Result;
use crate::types::{
    Assignment, MetricSnapshot, MetricSnapshotExport, MetricSnapshotWithAssignment, TimestampMillis,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Persistence contract of the metrics engine.
///
/// Assignments passed as queries match every stored assignment which has the
/// same values for the fields set in the query. Lists are returned in
/// ascending recording order. Every operation fails with
/// [`MetricsError::Storage`](crate::MetricsError::Storage) on I/O failure.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Snapshot with the highest index among the matching ones.
    async fn get_last_snapshot(
        &self,
        metric_name: &str,
        assignment: &Assignment,
    ) -> Result<Option<MetricSnapshotWithAssignment>>;

    /// Append a snapshot for exactly this assignment.
    async fn store_new_snapshot(
        &self,
        metric_name: &str,
        assignment: &Assignment,
        snapshot: &MetricSnapshot,
    ) -> Result<()>;

    /// Replace the snapshot with the same index and assignment.
    async fn overwrite_snapshot(
        &self,
        metric_name: &str,
        assignment: &Assignment,
        snapshot: &MetricSnapshot,
    ) -> Result<()>;

    /// Remove the earliest recorded matching snapshot. Fails if there is none.
    async fn remove_oldest_snapshot(&self, metric_name: &str, assignment: &Assignment) -> Result<()>;

    /// Remove every snapshot of the metric.
    async fn delete_snapshots(&self, metric_name: &str) -> Result<()>;

    async fn get_start_time(
        &self,
        metric_name: &str,
        assignment: &Assignment,
    ) -> Result<Option<TimestampMillis>>;

    async fn store_start_time(
        &self,
        metric_name: &str,
        assignment: &Assignment,
        start_time: TimestampMillis,
    ) -> Result<()>;

    /// Clear every matching start time; [`Assignment::any`] clears all of them.
    async fn clear_start_time(&self, metric_name: &str, assignment: &Assignment) -> Result<()>;

    async fn get_snapshots(
        &self,
        metric_name: &str,
        assignment: &Assignment,
    ) -> Result<Vec<MetricSnapshotWithAssignment>>;

    /// Matching snapshots with `start <= start_of_measurement < end`.
    ///
    /// Fails if a matching snapshot has no start of measurement.
    async fn get_snapshots_within_time_frame(
        &self,
        metric_name: &str,
        assignment: &Assignment,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<MetricSnapshotWithAssignment>>;

    async fn get_snapshot_count(&self, metric_name: &str, assignment: &Assignment) -> Result<u64>;

    /// Next execution id of the workflow, starting at 0.
    async fn get_new_execution_id(&self, workflow_id: &str) -> Result<u64>;

    /// Next schedule id, starting at 0.
    async fn get_new_schedule_id(&self) -> Result<u64>;

    /// Every stored snapshot of the given metrics, in recording order.
    async fn export_metric_snapshots(&self, metric_names: &[String]) -> Result<Vec<MetricSnapshotExport>>;
}
