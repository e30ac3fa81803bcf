//! Metric variants and the snapshot update algorithm they share.

mod duration;
mod meta;
mod number;

pub use duration::DurationMetric;
pub use meta::MetaMetric;
pub use number::NumberMetric;

use crate::aggregate;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use goalpath_core::time::{trim_duration, trim_value};
use goalpath_core::{
    Assignment, Clock, MetricDefinition, MetricKind, MetricSnapshot, MetricsError, MetricsStore, RecordPoint,
    RecordValue, Result,
};
use std::sync::Arc;
use tracing::trace;

/// Collaborators every metric works against.
#[derive(Clone)]
pub struct MetricContext {
    pub store: Arc<dyn MetricsStore>,
    pub clock: Arc<dyn Clock>,
}

impl MetricContext {
    pub fn new(store: Arc<dyn MetricsStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }
}

impl std::fmt::Debug for MetricContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricContext")
            .field("store", &"<dyn MetricsStore>")
            .field("clock", &self.clock)
            .finish()
    }
}

/// Behaviour of a registered metric.
#[async_trait]
pub trait MetricHandler: Send + Sync {
    fn definition(&self) -> &MetricDefinition;

    fn name(&self) -> &str {
        &self.definition().name
    }

    fn record_points(&self) -> Vec<RecordPoint> {
        self.definition().record_points()
    }

    fn clear_points(&self) -> Vec<RecordPoint> {
        self.definition().clear_points()
    }

    /// Metrics which have to be registered before this one.
    fn dependencies(&self) -> Vec<String> {
        self.definition().dependencies()
    }

    /// Check the definitions of [`dependencies`](Self::dependencies), in the same order.
    fn verify_dependency_definitions(&self, _definitions: &[&MetricDefinition]) -> Result<()> {
        Ok(())
    }

    /// Take a measurement at `point`.
    async fn record(&self, point: &str, assignment: &Assignment) -> Result<()>;

    /// Take a measurement with an externally supplied value.
    async fn record_value(&self, _point: &str, _assignment: &Assignment, _value: RecordValue) -> Result<()> {
        Err(MetricsError::unsupported(format!(
            "record_value is not supported by metric \"{}\"",
            self.name()
        )))
    }

    /// Reset state at clear point `point`.
    async fn clear(&self, point: &str) -> Result<()>;
}

/// A registered metric of any known kind.
#[derive(Debug)]
pub enum Metric {
    Number(NumberMetric),
    Duration(DurationMetric),
    Meta(MetaMetric),
}

macro_rules! each_variant {
    ($self:ident, $metric:ident => $body:expr) => {
        match $self {
            Metric::Number($metric) => $body,
            Metric::Duration($metric) => $body,
            Metric::Meta($metric) => $body,
        }
    };
}

#[async_trait]
impl MetricHandler for Metric {
    fn definition(&self) -> &MetricDefinition {
        each_variant!(self, m => m.definition())
    }

    fn verify_dependency_definitions(&self, definitions: &[&MetricDefinition]) -> Result<()> {
        each_variant!(self, m => m.verify_dependency_definitions(definitions))
    }

    async fn record(&self, point: &str, assignment: &Assignment) -> Result<()> {
        match self {
            Metric::Number(m) => m.record(point, assignment).await,
            Metric::Duration(m) => m.record(point, assignment).await,
            Metric::Meta(m) => m.record(point, assignment).await,
        }
    }

    async fn record_value(&self, point: &str, assignment: &Assignment, value: RecordValue) -> Result<()> {
        match self {
            Metric::Number(m) => m.record_value(point, assignment, value).await,
            Metric::Duration(m) => m.record_value(point, assignment, value).await,
            Metric::Meta(m) => m.record_value(point, assignment, value).await,
        }
    }

    async fn clear(&self, point: &str) -> Result<()> {
        match self {
            Metric::Number(m) => m.clear(point).await,
            Metric::Duration(m) => m.clear(point).await,
            Metric::Meta(m) => m.clear(point).await,
        }
    }
}

pub(crate) fn ensure_record_point(definition: &MetricDefinition, point: &str) -> Result<()> {
    if definition.record_points().iter().any(|p| p == point) {
        Ok(())
    } else {
        Err(MetricsError::unhandled_record_point(&definition.name, point))
    }
}

/// Check that `assignment` supplies every field the definition requires and
/// drop the fields it does not use.
pub(crate) fn verify_and_trim_assignment(definition: &MetricDefinition, assignment: &Assignment) -> Result<Assignment> {
    if definition.assignment.iter().any(|option| !assignment.supplies(*option)) {
        let required: Vec<&str> = definition.assignment.iter().map(|o| o.as_str()).collect();
        return Err(MetricsError::invalid_assignment(format!(
            "Not all assignments required by metric \"{}\" are supplied. Required: [{}]; Supplied: {}",
            definition.name,
            required.join(", "),
            assignment
        )));
    }
    Ok(assignment.trimmed_to(&definition.assignment))
}

/// Delete every snapshot if `point` is one of the definition's delete events.
pub(crate) async fn delete_snapshots_on(
    definition: &MetricDefinition,
    store: &dyn MetricsStore,
    point: &str,
) -> Result<()> {
    if !definition.delete_snapshots_events.iter().any(|p| p == point) {
        return Err(MetricsError::unhandled_clear_point(&definition.name, point));
    }
    store.delete_snapshots(&definition.name).await
}

/// Round an aggregate value to the accuracy configured in `agg`.
fn round_aggregate(definition: &MetricDefinition, value: RecordValue) -> RecordValue {
    let Some(agg) = &definition.agg else {
        return value;
    };
    match definition.kind {
        MetricKind::Duration(_) => trim_duration(value, agg.duration_accuracy),
        _ => match agg.accuracy {
            Some(accuracy) if accuracy > 0.0 => trim_value(value, accuracy),
            _ => value,
        },
    }
}

fn is_new_snapshot_required(
    definition: &MetricDefinition,
    last: &MetricSnapshot,
    timestamp: Option<i64>,
) -> Result<bool> {
    let Some(agg) = &definition.agg else {
        return Ok(true);
    };
    if agg.time.accuracy().is_none() {
        return Ok(false);
    }
    match timestamp {
        Some(timestamp) => Ok(last.start_of_measurement != Some(timestamp)),
        None => Err(MetricsError::internal("No timestamp supplied, but it is required.")),
    }
}

/// Persist `value` for `assignment`: either as a new snapshot or merged into
/// the last one, depending on the aggregation settings.
///
/// `value_is_aggregate` marks values which already are an aggregate (meta
/// metrics); they replace the snapshot value instead of being folded in.
pub(crate) async fn update_snapshots(
    definition: &MetricDefinition,
    store: &dyn MetricsStore,
    assignment: &Assignment,
    value: RecordValue,
    value_is_aggregate: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let name = definition.name.as_str();
    let assignment = verify_and_trim_assignment(definition, assignment)?;
    let timestamp = definition.timestamp_accuracy().map(|accuracy| accuracy.round_down_millis(now));

    let last = store
        .get_last_snapshot(name, &assignment)
        .await?
        .map(|entry| entry.snapshot);

    let last = match last {
        Some(last) if !is_new_snapshot_required(definition, &last, timestamp)? => last,
        last => {
            let index = last.map_or(0, |last| last.index + 1);
            return store_new(definition, store, &assignment, index, value, value_is_aggregate, timestamp).await;
        }
    };

    let Some(agg) = &definition.agg else {
        return Err(MetricsError::internal("Trying to merge into a snapshot of a non-aggregating metric"));
    };
    let helpers = aggregate::updated_helpers(&last.helpers, value);
    let aggregate = if value_is_aggregate {
        value
    } else {
        aggregate::incremental(agg.operation, &helpers)?
    };
    let merged = MetricSnapshot::new(last.index, round_aggregate(definition, aggregate), timestamp).with_helpers(helpers);
    trace!(metric = name, index = merged.index, value = merged.value, "Merging snapshot");
    store.overwrite_snapshot(name, &assignment, &merged).await
}

async fn store_new(
    definition: &MetricDefinition,
    store: &dyn MetricsStore,
    assignment: &Assignment,
    index: u64,
    value: RecordValue,
    value_is_aggregate: bool,
    timestamp: Option<i64>,
) -> Result<()> {
    let name = definition.name.as_str();
    let snapshot = match &definition.agg {
        Some(agg) => {
            let helpers = aggregate::initial_helpers(agg.operation, value, value_is_aggregate);
            let aggregate = if value_is_aggregate {
                value
            } else {
                aggregate::incremental(agg.operation, &helpers)?
            };
            MetricSnapshot::new(index, round_aggregate(definition, aggregate), timestamp).with_helpers(helpers)
        }
        None => MetricSnapshot::new(index, value, timestamp),
    };
    trace!(metric = name, index, value = snapshot.value, "Storing new snapshot");
    store.store_new_snapshot(name, assignment, &snapshot).await?;

    // store first, then evict: an interrupted eviction is repaired by the next recording
    if let Some(max) = definition.snapshots.max() {
        while store.get_snapshot_count(name, assignment).await? > max {
            store.remove_oldest_snapshot(name, assignment).await?;
        }
    }
    Ok(())
}
