//! Construction of metric instances from definitions.

use crate::metric::{DurationMetric, MetaMetric, Metric, MetricContext, NumberMetric};
use goalpath_core::{MetricDefinition, MetricKind, Result};
use std::sync::Arc;

/// Builds the [`Metric`] variant matching a definition's `type`.
#[derive(Debug, Clone)]
pub struct MetricFactory {
    ctx: MetricContext,
}

impl MetricFactory {
    pub fn new(ctx: MetricContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &MetricContext {
        &self.ctx
    }

    /// Validate `definition` and build its metric.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidDefinition`](goalpath_core::MetricsError::InvalidDefinition)
    /// if the definition violates a constraint.
    pub fn create(&self, definition: MetricDefinition) -> Result<Metric> {
        definition.validate()?;
        let definition = Arc::new(definition);
        let ctx = self.ctx.clone();
        Ok(match &definition.kind {
            MetricKind::Int(_) | MetricKind::Float(_) => Metric::Number(NumberMetric::new(definition.clone(), ctx)?),
            MetricKind::Duration(_) => Metric::Duration(DurationMetric::new(definition.clone(), ctx)?),
            MetricKind::Meta(_) => Metric::Meta(MetaMetric::new(definition.clone(), ctx)?),
        })
    }
}
