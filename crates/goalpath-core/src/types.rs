//! Value types shared by the registry, the metrics and the stores.

use crate::error::{MetricsError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Name of a lifecycle event which may be recorded or cleared by metrics.
pub type RecordPoint = String;

/// Type of a recorded value.
pub type RecordValue = f64;

/// Milliseconds since the Unix epoch (UTC).
pub type TimestampMillis = i64;

/// Kind of an event point lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Event triggers a new measurement
    Record,
    /// Event resets accumulated state
    Clear,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Record => "record",
            EventType::Clear => "clear",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "record" => Ok(EventType::Record),
            "clear" => Ok(EventType::Clear),
            other => Err(MetricsError::invalid_event_type(other)),
        }
    }
}

/// Field of an assignment which a metric may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentOption {
    Schedule,
    Workflow,
    WorkflowVersion,
    Execution,
    Task,
}

impl AssignmentOption {
    /// All options in canonical order.
    pub const ALL: [AssignmentOption; 5] = [
        AssignmentOption::Schedule,
        AssignmentOption::Workflow,
        AssignmentOption::WorkflowVersion,
        AssignmentOption::Execution,
        AssignmentOption::Task,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentOption::Schedule => "schedule",
            AssignmentOption::Workflow => "workflow",
            AssignmentOption::WorkflowVersion => "workflow_version",
            AssignmentOption::Execution => "execution",
            AssignmentOption::Task => "task",
        }
    }
}

impl fmt::Display for AssignmentOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete scope of a recording: which schedule/workflow/execution/task it belongs to.
///
/// Unset fields act as wildcards when the assignment is used as a store query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<u64>,
}

impl Assignment {
    /// Empty assignment, matching every stored assignment when used as a query.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn with_schedule(mut self, schedule_id: u64) -> Self {
        self.schedule_id = Some(schedule_id);
        self
    }

    pub fn with_workflow(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }

    pub fn with_workflow_version(mut self, workflow_version_id: impl Into<String>) -> Self {
        self.workflow_version_id = Some(workflow_version_id.into());
        self
    }

    pub fn with_execution(mut self, execution_id: u64) -> Self {
        self.execution_id = Some(execution_id);
        self
    }

    pub fn with_task(mut self, task_id: u64) -> Self {
        self.task_id = Some(task_id);
        self
    }

    /// Whether the field for `option` is set.
    pub fn supplies(&self, option: AssignmentOption) -> bool {
        match option {
            AssignmentOption::Schedule => self.schedule_id.is_some(),
            AssignmentOption::Workflow => self.workflow_id.is_some(),
            AssignmentOption::WorkflowVersion => self.workflow_version_id.is_some(),
            AssignmentOption::Execution => self.execution_id.is_some(),
            AssignmentOption::Task => self.task_id.is_some(),
        }
    }

    /// Options which are set, in canonical order.
    pub fn supplied_options(&self) -> Vec<AssignmentOption> {
        AssignmentOption::ALL
            .into_iter()
            .filter(|option| self.supplies(*option))
            .collect()
    }

    /// Keep only the fields listed in `options`.
    pub fn trimmed_to(&self, options: &[AssignmentOption]) -> Self {
        let keep = |option: AssignmentOption| options.contains(&option);
        Self {
            schedule_id: self.schedule_id.filter(|_| keep(AssignmentOption::Schedule)),
            workflow_id: self
                .workflow_id
                .clone()
                .filter(|_| keep(AssignmentOption::Workflow)),
            workflow_version_id: self
                .workflow_version_id
                .clone()
                .filter(|_| keep(AssignmentOption::WorkflowVersion)),
            execution_id: self.execution_id.filter(|_| keep(AssignmentOption::Execution)),
            task_id: self.task_id.filter(|_| keep(AssignmentOption::Task)),
        }
    }

    /// True if every field set in `query` has the same value here.
    pub fn matches(&self, query: &Assignment) -> bool {
        fn field<T: PartialEq>(stored: &Option<T>, wanted: &Option<T>) -> bool {
            wanted.is_none() || stored == wanted
        }
        field(&self.schedule_id, &query.schedule_id)
            && field(&self.workflow_id, &query.workflow_id)
            && field(&self.workflow_version_id, &query.workflow_version_id)
            && field(&self.execution_id, &query.execution_id)
            && field(&self.task_id, &query.task_id)
    }

    pub fn is_empty(&self) -> bool {
        self.supplied_options().is_empty()
    }

    /// Stable string form used as part of storage keys.
    pub fn storage_key(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

/// Helper values which allow aggregates to be updated incrementally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateHelpers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_measurements: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum_of_measurements: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welford_mean: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub welford_m2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_max: Option<f64>,
}

/// One measurement of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    /// Position in the history of one (metric, assignment) pair
    pub index: u64,
    /// Measured or aggregated value; NaN is persisted as `null`
    #[serde(with = "nan_as_null")]
    pub value: RecordValue,
    /// Trimmed start of the time bucket, if the metric records timestamps
    pub start_of_measurement: Option<TimestampMillis>,
    #[serde(flatten)]
    pub helpers: AggregateHelpers,
}

impl MetricSnapshot {
    pub fn new(index: u64, value: RecordValue, start_of_measurement: Option<TimestampMillis>) -> Self {
        Self {
            index,
            value,
            start_of_measurement,
            helpers: AggregateHelpers::default(),
        }
    }

    pub fn with_helpers(mut self, helpers: AggregateHelpers) -> Self {
        self.helpers = helpers;
        self
    }
}

/// A snapshot together with the assignment it was recorded for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshotWithAssignment {
    #[serde(flatten)]
    pub snapshot: MetricSnapshot,
    pub assignment: Assignment,
}

/// Flat export record: metric name next to the snapshot fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshotExport {
    pub metric_name: String,
    #[serde(flatten)]
    pub entry: MetricSnapshotWithAssignment,
}

mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_f64(*value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}
