//! Error types for the goalpath metrics engine.

/// Result type alias for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;

/// Main error type for the metrics engine.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// A metric with the same name is already registered
    #[error("Metric \"{0}\" has already been registered!")]
    DuplicateMetric(String),

    /// Dependencies of a metric are not registered (yet)
    #[error(
        "Metric \"{metric}\" has unfulfilled dependencies (registration order matters): {}",
        missing.join(", ")
    )]
    UnfulfilledDependency { metric: String, missing: Vec<String> },

    /// A dependency definition is not acceptable to the dependent metric
    #[error("Dependency mismatch for metric \"{metric}\": {reason}")]
    DependencyMismatch { metric: String, reason: String },

    /// Lookup of a metric which is not registered
    #[error("Metric \"{0}\" is not registered!")]
    UnknownMetric(String),

    /// Definition failed validation
    #[error("Validation failed for metric '{metric}': {reason}")]
    InvalidDefinition { metric: String, reason: String },

    /// Record point or clear point is not handled by the metric
    #[error("{kind} \"{point}\" is not handled by metric \"{metric}\"")]
    UnhandledEventPoint {
        metric: String,
        kind: &'static str,
        point: String,
    },

    /// Event type outside of record/clear
    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    /// Assignment does not satisfy the metric definition
    #[error("Invalid assignment: {0}")]
    InvalidAssignment(String),

    /// Recorded value is not acceptable
    #[error("Invalid value for metric \"{metric}\": {reason}")]
    InvalidValue { metric: String, reason: String },

    /// Operation not supported by the metric kind
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Aggregate cannot be computed incrementally
    #[error("Aggregate '{0}' cannot be computed incrementally")]
    UnsupportedAggregate(String),

    /// Persistence layer errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Wrapped anyhow errors for compatibility
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MetricsError {
    /// Create a new duplicate metric error
    pub fn duplicate_metric(name: impl Into<String>) -> Self {
        Self::DuplicateMetric(name.into())
    }

    /// Create a new unfulfilled dependency error
    pub fn unfulfilled_dependency(metric: impl Into<String>, missing: Vec<String>) -> Self {
        Self::UnfulfilledDependency {
            metric: metric.into(),
            missing,
        }
    }

    /// Create a new dependency mismatch error
    pub fn dependency_mismatch(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DependencyMismatch {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    /// Create a new unknown metric error
    pub fn unknown_metric(name: impl Into<String>) -> Self {
        Self::UnknownMetric(name.into())
    }

    /// Create a new invalid definition error
    pub fn invalid_definition(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    /// Create a new error for a record point the metric does not handle
    pub fn unhandled_record_point(metric: impl Into<String>, point: impl Into<String>) -> Self {
        Self::UnhandledEventPoint {
            metric: metric.into(),
            kind: "RecordPoint",
            point: point.into(),
        }
    }

    /// Create a new error for a clear point the metric does not handle
    pub fn unhandled_clear_point(metric: impl Into<String>, point: impl Into<String>) -> Self {
        Self::UnhandledEventPoint {
            metric: metric.into(),
            kind: "ClearPoint",
            point: point.into(),
        }
    }

    /// Create a new invalid event type error
    pub fn invalid_event_type(value: impl Into<String>) -> Self {
        Self::InvalidEventType(value.into())
    }

    /// Create a new invalid assignment error
    pub fn invalid_assignment(msg: impl Into<String>) -> Self {
        Self::InvalidAssignment(msg.into())
    }

    /// Create a new invalid value error
    pub fn invalid_value(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            metric: metric.into(),
            reason: reason.into(),
        }
    }

    /// Create a new unsupported operation error
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Check if this is a duplicate registration error
    pub fn is_duplicate_metric(&self) -> bool {
        matches!(self, Self::DuplicateMetric(_))
    }

    /// Check if this is an unfulfilled dependency error
    pub fn is_unfulfilled_dependency(&self) -> bool {
        matches!(self, Self::UnfulfilledDependency { .. })
    }

    /// Check if this is a dependency mismatch error
    pub fn is_dependency_mismatch(&self) -> bool {
        matches!(self, Self::DependencyMismatch { .. })
    }

    /// Check if this is an unknown metric error
    pub fn is_unknown_metric(&self) -> bool {
        matches!(self, Self::UnknownMetric(_))
    }

    /// Check if this is an invalid definition error
    pub fn is_invalid_definition(&self) -> bool {
        matches!(self, Self::InvalidDefinition { .. })
    }

    /// Check if this is a storage error
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Io(_))
    }
}
