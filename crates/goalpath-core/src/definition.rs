//! Metric definitions.
//!
//! A definition is plain data: it is parsed from configuration (TOML/JSON) or
//! built in code, validated once by [`MetricDefinition::validate`] and then kept
//! immutable by the registry.
//!
//! ```toml
//! [[metrics]]
//! name = "taskDuration"
//! type = "duration"
//! assignment = ["workflow", "execution", "task"]
//! snapshots = 5
//! record_start = "taskStarted"
//! record_stop = "taskCompleted"
//! duration_accuracy = [1, "s"]
//! handle_incomplete = "truncate"
//! ```

use crate::error::{MetricsError, Result};
use crate::time::{DurationAccuracy, TimeAccuracy};
use crate::types::{AssignmentOption, RecordPoint};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::{BTreeMap, HashSet};

/// Maximum number of snapshots kept per (metric, assignment) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotLimit {
    Bounded(u32),
    Unbounded,
}

impl SnapshotLimit {
    pub fn max(&self) -> Option<u64> {
        match self {
            SnapshotLimit::Bounded(n) => Some(u64::from(*n)),
            SnapshotLimit::Unbounded => None,
        }
    }
}

impl Default for SnapshotLimit {
    fn default() -> Self {
        SnapshotLimit::Bounded(1)
    }
}

impl Serialize for SnapshotLimit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SnapshotLimit::Bounded(n) => serializer.serialize_u32(*n),
            SnapshotLimit::Unbounded => serializer.serialize_str("inf"),
        }
    }
}

impl<'de> Deserialize<'de> for SnapshotLimit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Count(u32),
            Label(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Count(n) => Ok(SnapshotLimit::Bounded(n)),
            Repr::Label(label) if label == "inf" => Ok(SnapshotLimit::Unbounded),
            Repr::Label(label) => Err(serde::de::Error::custom(format!(
                "expected a positive integer or \"inf\", got \"{}\"",
                label
            ))),
        }
    }
}

/// Aggregate operation of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateFunction {
    Min,
    Max,
    Sum,
    Average,
    Median,
    Variance,
}

impl AggregateFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Average => "average",
            AggregateFunction::Median => "median",
            AggregateFunction::Variance => "variance",
        }
    }
}

impl std::fmt::Display for AggregateFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time span over which a single snapshot aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateTime {
    All,
    Hour,
    #[serde(alias = "1/4day")]
    QuarterDay,
    Day,
    Week,
}

impl AggregateTime {
    /// Bucket accuracy, or `None` when everything is aggregated into one snapshot.
    pub fn accuracy(&self) -> Option<TimeAccuracy> {
        match self {
            AggregateTime::All => None,
            AggregateTime::Hour => Some(TimeAccuracy::Hour),
            AggregateTime::QuarterDay => Some(TimeAccuracy::QuarterDay),
            AggregateTime::Day => Some(TimeAccuracy::Day),
            AggregateTime::Week => Some(TimeAccuracy::Week),
        }
    }
}

/// Aggregation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggSpec {
    pub operation: AggregateFunction,
    pub time: AggregateTime,
    /// Accuracy of the aggregate value (number and meta metrics)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// Accuracy of the aggregate value (duration metrics)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_accuracy: Option<DurationAccuracy>,
}

impl AggSpec {
    pub fn new(operation: AggregateFunction, time: AggregateTime) -> Self {
        Self {
            operation,
            time,
            accuracy: None,
            duration_accuracy: None,
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_duration_accuracy(mut self, accuracy: DurationAccuracy) -> Self {
        self.duration_accuracy = Some(accuracy);
        self
    }
}

/// Strategy for a duration measurement started again before it was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleIncomplete {
    /// Drop the pending start time
    Ignore,
    /// Record the partial duration up to the new start
    Truncate,
}

/// Parameters of `int` and `float` metrics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NumberSpec {
    pub record_points: Vec<RecordPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub const_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub const_value_map: Option<BTreeMap<RecordPoint, f64>>,
}

impl NumberSpec {
    pub fn new<I, S>(record_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RecordPoint>,
    {
        Self {
            record_points: record_points.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_const_value(mut self, value: f64) -> Self {
        self.const_value = Some(value);
        self
    }

    pub fn with_const_value_map<I, S>(mut self, entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<RecordPoint>,
    {
        self.const_value_map = Some(entries.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    /// Constant recorded at `record_point`, if the definition supplies one.
    pub fn constant_for(&self, record_point: &str) -> Option<f64> {
        self.const_value.or_else(|| {
            self.const_value_map
                .as_ref()
                .and_then(|map| map.get(record_point).copied())
        })
    }
}

/// Parameters of `duration` metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationSpec {
    pub record_start: RecordPoint,
    pub record_stop: RecordPoint,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub clear_incomplete_events: Vec<RecordPoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_accuracy: Option<DurationAccuracy>,
    pub handle_incomplete: HandleIncomplete,
}

impl DurationSpec {
    pub fn new(
        record_start: impl Into<RecordPoint>,
        record_stop: impl Into<RecordPoint>,
        handle_incomplete: HandleIncomplete,
    ) -> Self {
        Self {
            record_start: record_start.into(),
            record_stop: record_stop.into(),
            clear_incomplete_events: Vec::new(),
            duration_accuracy: None,
            handle_incomplete,
        }
    }

    pub fn with_duration_accuracy(mut self, accuracy: DurationAccuracy) -> Self {
        self.duration_accuracy = Some(accuracy);
        self
    }

    pub fn with_clear_incomplete_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RecordPoint>,
    {
        self.clear_incomplete_events = events.into_iter().map(Into::into).collect();
        self
    }
}

/// Parameters of `meta` metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaSpec {
    /// Metric the value is derived from
    pub meta_reference: String,
    pub record_points: Vec<RecordPoint>,
}

impl MetaSpec {
    pub fn new<I, S>(meta_reference: impl Into<String>, record_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RecordPoint>,
    {
        Self {
            meta_reference: meta_reference.into(),
            record_points: record_points.into_iter().map(Into::into).collect(),
        }
    }
}

/// Kind-specific part of a definition, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetricKind {
    Int(NumberSpec),
    Float(NumberSpec),
    Duration(DurationSpec),
    Meta(MetaSpec),
}

impl MetricKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            MetricKind::Int(_) => "int",
            MetricKind::Float(_) => "float",
            MetricKind::Duration(_) => "duration",
            MetricKind::Meta(_) => "meta",
        }
    }
}

/// Complete definition of a metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub name: String,
    /// Private metrics are never listed for export
    #[serde(default)]
    pub private: bool,
    /// Clear points at which every snapshot of the metric is deleted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete_snapshots_events: Vec<RecordPoint>,
    /// Assignment fields a recording has to supply
    #[serde(default)]
    pub assignment: Vec<AssignmentOption>,
    #[serde(default)]
    pub snapshots: SnapshotLimit,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimeAccuracy>,
    #[serde(default)]
    pub export_order: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agg: Option<AggSpec>,
    #[serde(flatten)]
    pub kind: MetricKind,
}

impl MetricDefinition {
    pub fn new(name: impl Into<String>, kind: MetricKind) -> Self {
        Self {
            name: name.into(),
            private: false,
            delete_snapshots_events: Vec::new(),
            assignment: Vec::new(),
            snapshots: SnapshotLimit::default(),
            timestamp: None,
            export_order: false,
            agg: None,
            kind,
        }
    }

    pub fn int(name: impl Into<String>, spec: NumberSpec) -> Self {
        Self::new(name, MetricKind::Int(spec))
    }

    pub fn float(name: impl Into<String>, spec: NumberSpec) -> Self {
        Self::new(name, MetricKind::Float(spec))
    }

    pub fn duration(name: impl Into<String>, spec: DurationSpec) -> Self {
        Self::new(name, MetricKind::Duration(spec))
    }

    pub fn meta(name: impl Into<String>, spec: MetaSpec) -> Self {
        Self::new(name, MetricKind::Meta(spec))
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    pub fn with_assignment(mut self, options: &[AssignmentOption]) -> Self {
        self.assignment = options.to_vec();
        self
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotLimit) -> Self {
        self.snapshots = snapshots;
        self
    }

    pub fn with_timestamp(mut self, accuracy: TimeAccuracy) -> Self {
        self.timestamp = Some(accuracy);
        self
    }

    pub fn with_agg(mut self, agg: AggSpec) -> Self {
        self.agg = Some(agg);
        self
    }

    pub fn with_export_order(mut self) -> Self {
        self.export_order = true;
        self
    }

    pub fn with_delete_snapshots_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<RecordPoint>,
    {
        self.delete_snapshots_events = events.into_iter().map(Into::into).collect();
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Events which trigger a measurement, in declaration order.
    pub fn record_points(&self) -> Vec<RecordPoint> {
        match &self.kind {
            MetricKind::Int(spec) | MetricKind::Float(spec) => spec.record_points.clone(),
            MetricKind::Meta(spec) => spec.record_points.clone(),
            MetricKind::Duration(spec) => {
                dedup_ordered([&spec.record_start, &spec.record_stop].into_iter())
            }
        }
    }

    /// Events which reset state: snapshot deletion plus incomplete duration clearing.
    pub fn clear_points(&self) -> Vec<RecordPoint> {
        let incomplete: &[RecordPoint] = match &self.kind {
            MetricKind::Duration(spec) => &spec.clear_incomplete_events,
            _ => &[],
        };
        dedup_ordered(self.delete_snapshots_events.iter().chain(incomplete.iter()))
    }

    /// Names of metrics which must be registered before this one.
    pub fn dependencies(&self) -> Vec<String> {
        match &self.kind {
            MetricKind::Meta(spec) => vec![spec.meta_reference.clone()],
            _ => Vec::new(),
        }
    }

    /// Whether snapshots of this metric carry a start of measurement.
    pub fn records_timestamps(&self) -> bool {
        self.timestamp_accuracy().is_some()
    }

    /// Accuracy used to trim the start of measurement. Aggregation buckets win over `timestamp`.
    pub fn timestamp_accuracy(&self) -> Option<TimeAccuracy> {
        self.agg
            .as_ref()
            .and_then(|agg| agg.time.accuracy())
            .or(self.timestamp)
    }

    /// Check every structural constraint of the definition.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidDefinition`] naming the first violated constraint.
    pub fn validate(&self) -> Result<()> {
        match self.constraint_error() {
            Some(reason) => Err(MetricsError::invalid_definition(&self.name, reason)),
            None => Ok(()),
        }
    }

    fn constraint_error(&self) -> Option<String> {
        if self.name.trim().is_empty() {
            return Some("Metric name should not be empty!".to_string());
        }
        if self.name.trim() != self.name {
            return Some("Metric name should not be padded with whitespaces.".to_string());
        }
        if self.name.chars().any(char::is_control) {
            return Some("Metric name should not contain control characters.".to_string());
        }

        let record_points = match &self.kind {
            MetricKind::Int(spec) | MetricKind::Float(spec) => spec.record_points.clone(),
            MetricKind::Meta(spec) => spec.record_points.clone(),
            MetricKind::Duration(spec) => vec![spec.record_start.clone(), spec.record_stop.clone()],
        };
        if record_points.is_empty() {
            return Some("No record points.".to_string());
        }
        let mut seen = HashSet::new();
        for (i, point) in record_points.iter().enumerate() {
            if let Some(err) = event_name_error("RecordPoint", point, i) {
                return Some(err);
            }
            if !seen.insert(point.as_str()) {
                return Some(format!(
                    "RecordPoint with name \"{}\" at index {} has already been specified as RecordPoint.",
                    point, i
                ));
            }
        }
        for (i, point) in self.delete_snapshots_events.iter().enumerate() {
            if let Some(err) = event_name_error("ClearPoint", point, i) {
                return Some(err);
            }
        }

        if self.snapshots == SnapshotLimit::Bounded(0) {
            return Some("Number of snapshots has to be integer > 0 or \"inf\".".to_string());
        }
        if self.agg.is_some() && self.timestamp.is_some() {
            return Some(
                "The attributes \"agg\" and \"timestamp\" are mutually exclusive and can not be used together."
                    .to_string(),
            );
        }
        let mut seen_options = HashSet::new();
        if let Some(option) = self.assignment.iter().find(|o| !seen_options.insert(**o)) {
            return Some(format!("Assignment option \"{}\" is listed more than once.", option));
        }

        match &self.kind {
            MetricKind::Int(spec) => self.number_constraint_error(spec, true),
            MetricKind::Float(spec) => self.number_constraint_error(spec, false),
            MetricKind::Duration(spec) => self.duration_constraint_error(spec),
            MetricKind::Meta(spec) => self.meta_constraint_error(spec),
        }
    }

    fn number_constraint_error(&self, spec: &NumberSpec, integral: bool) -> Option<String> {
        if spec.accuracy.is_some_and(|a| a < 0.0) {
            return Some("accuracy should not be negative.".to_string());
        }
        if spec.const_value.is_some() && spec.const_value_map.is_some() {
            return Some("const_value and const_value_map are mutually exclusive.".to_string());
        }
        if let Some(value) = spec.const_value {
            if integral && value.fract() != 0.0 {
                return Some("const_value should not be float for int metrics.".to_string());
            }
        }
        if let Some(map) = &spec.const_value_map {
            let mut keys: Vec<&String> = map.keys().collect();
            let mut points: Vec<&String> = spec.record_points.iter().collect();
            keys.sort();
            points.sort();
            if keys != points {
                return Some(format!(
                    "every record point should have a matching entry in const_value_map. Expected {:?} to equal {:?}",
                    keys, points
                ));
            }
            if integral && map.values().any(|v| v.fract() != 0.0) {
                return Some("every value in const_value_map should be int for int metrics".to_string());
            }
            if map.values().any(|v| !v.is_finite()) {
                return Some("every value in const_value_map should be a number".to_string());
            }
        }
        self.value_agg_error()
    }

    fn duration_constraint_error(&self, spec: &DurationSpec) -> Option<String> {
        if spec.record_start == spec.record_stop {
            return Some("record_start and record_stop should differ.".to_string());
        }
        for (i, point) in spec.clear_incomplete_events.iter().enumerate() {
            if let Some(err) = event_name_error("ClearPoint", point, i) {
                return Some(err);
            }
        }
        if spec.duration_accuracy.is_some_and(|a| a.amount() < 0.0) {
            return Some("duration_accuracy should not be negative.".to_string());
        }
        if let Some(agg) = &self.agg {
            if agg.accuracy.is_some() {
                return Some("\"agg.accuracy\" is not supported by duration metrics, use \"agg.duration_accuracy\".".to_string());
            }
            if agg.duration_accuracy.is_some_and(|a| a.amount() < 0.0) {
                return Some("agg.duration_accuracy should not be negative.".to_string());
            }
        }
        None
    }

    fn meta_constraint_error(&self, spec: &MetaSpec) -> Option<String> {
        if spec.meta_reference.trim().is_empty() {
            return Some("meta_reference should not be empty.".to_string());
        }
        if spec.meta_reference == self.name {
            return Some("meta_reference should not reference the metric itself.".to_string());
        }
        self.value_agg_error()
    }

    fn value_agg_error(&self) -> Option<String> {
        let agg = self.agg.as_ref()?;
        if agg.duration_accuracy.is_some() {
            return Some("\"agg.duration_accuracy\" is only supported by duration metrics.".to_string());
        }
        if agg.accuracy.is_some_and(|a| a < 0.0) {
            return Some("\"agg.accuracy\" should not be negative.".to_string());
        }
        None
    }
}

fn event_name_error(kind: &str, point: &str, index: usize) -> Option<String> {
    let prefix = format!("{} with name \"{}\" at index {} ", kind, point, index);
    if point.is_empty() {
        return Some(prefix + "should have length > 0.");
    }
    if point.trim() != point {
        return Some(prefix + "should not be padded with whitespaces.");
    }
    None
}

fn dedup_ordered<'a>(points: impl Iterator<Item = &'a RecordPoint>) -> Vec<RecordPoint> {
    let mut seen = HashSet::new();
    points
        .filter(|p| seen.insert(p.as_str()))
        .cloned()
        .collect()
}
