use super::{delete_snapshots_on, ensure_record_point, update_snapshots, MetricContext, MetricHandler};
use async_trait::async_trait;
use goalpath_core::time::trim_value;
use goalpath_core::{Assignment, MetricDefinition, MetricKind, MetricsError, NumberSpec, RecordValue, Result};
use std::sync::Arc;

/// `int` or `float` metric recording constants or supplied values.
#[derive(Debug)]
pub struct NumberMetric {
    definition: Arc<MetricDefinition>,
    spec: NumberSpec,
    integral: bool,
    ctx: MetricContext,
}

impl NumberMetric {
    pub fn new(definition: Arc<MetricDefinition>, ctx: MetricContext) -> Result<Self> {
        let (spec, integral) = match &definition.kind {
            MetricKind::Int(spec) => (spec.clone(), true),
            MetricKind::Float(spec) => (spec.clone(), false),
            other => {
                return Err(MetricsError::internal(format!(
                    "Number metric cannot be built from a {} definition",
                    other.type_name()
                )));
            }
        };
        Ok(Self {
            definition,
            spec,
            integral,
            ctx,
        })
    }

    fn invalid(&self, reason: impl Into<String>) -> MetricsError {
        MetricsError::invalid_value(&self.definition.name, reason)
    }
}

#[async_trait]
impl MetricHandler for NumberMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.definition
    }

    async fn record(&self, point: &str, assignment: &Assignment) -> Result<()> {
        ensure_record_point(&self.definition, point)?;
        let value = self
            .spec
            .constant_for(point)
            .ok_or_else(|| self.invalid("Value is needed for number metrics without const_value/const_value_map."))?;
        self.record_value(point, assignment, value).await
    }

    async fn record_value(&self, point: &str, assignment: &Assignment, value: RecordValue) -> Result<()> {
        ensure_record_point(&self.definition, point)?;
        if self.spec.const_value.is_some_and(|constant| constant != value) {
            return Err(self.invalid("Value is already provided by const_value definition."));
        }
        if let Some(map) = &self.spec.const_value_map {
            if map.get(point) != Some(&value) {
                return Err(self.invalid("Value is already provided by const_value_map definition."));
            }
        }
        if !value.is_finite() {
            return Err(self.invalid(format!("Recorded value should be a finite number, got {}", value)));
        }

        let value = match self.spec.accuracy {
            Some(accuracy) => trim_value(value, accuracy),
            None => value,
        };
        if self.integral && value.fract() != 0.0 {
            return Err(self.invalid(format!("Trimmed value {} does not fit into metric type \"int\"", value)));
        }

        update_snapshots(
            &self.definition,
            self.ctx.store.as_ref(),
            assignment,
            value,
            false,
            self.ctx.clock.now(),
        )
        .await
    }

    async fn clear(&self, point: &str) -> Result<()> {
        delete_snapshots_on(&self.definition, self.ctx.store.as_ref(), point).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use goalpath_core::{AggSpec, AggregateFunction, AggregateTime, AssignmentOption, SnapshotLimit};

    fn metric(definition: MetricDefinition, ctx: &MetricContext) -> NumberMetric {
        NumberMetric::new(Arc::new(definition), ctx.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_record_uses_constants() {
        let (ctx, _) = context();
        let counter = metric(
            MetricDefinition::int("count", NumberSpec::new(["a", "b"]).with_const_value_map([("a", 1.0), ("b", 0.0)]))
                .with_agg(AggSpec::new(AggregateFunction::Sum, AggregateTime::All)),
            &ctx,
        );

        counter.record("a", &Assignment::any()).await.unwrap();
        counter.record("b", &Assignment::any()).await.unwrap();
        counter.record("a", &Assignment::any()).await.unwrap();

        assert_eq!(values(&ctx, "count", &Assignment::any()).await, vec![2.0]);
    }

    #[tokio::test]
    async fn test_record_without_constant_needs_value() {
        let (ctx, _) = context();
        let plain = metric(MetricDefinition::float("plain", NumberSpec::new(["p"])), &ctx);

        let err = plain.record("p", &Assignment::any()).await.unwrap_err();
        assert!(matches!(err, MetricsError::InvalidValue { .. }));
        assert!(err.to_string().contains("Value is needed"));
    }

    #[tokio::test]
    async fn test_record_value_conflicting_with_constant() {
        let (ctx, _) = context();
        let constant = metric(
            MetricDefinition::int("c", NumberSpec::new(["p"]).with_const_value(1.0)),
            &ctx,
        );

        assert!(constant.record_value("p", &Assignment::any(), 2.0).await.is_err());
        constant.record_value("p", &Assignment::any(), 1.0).await.unwrap();
        assert_eq!(values(&ctx, "c", &Assignment::any()).await, vec![1.0]);
    }

    #[tokio::test]
    async fn test_accuracy_floors_and_int_rejects_fractions() {
        let (ctx, _) = context();
        let floored = metric(
            MetricDefinition::float("f", NumberSpec::new(["p"]).with_accuracy(0.25))
                .with_snapshots(SnapshotLimit::Unbounded),
            &ctx,
        );
        floored.record_value("p", &Assignment::any(), 1.3).await.unwrap();
        floored.record_value("p", &Assignment::any(), -0.1).await.unwrap();
        assert_eq!(values(&ctx, "f", &Assignment::any()).await, vec![1.25, -0.25]);

        let int = metric(MetricDefinition::int("i", NumberSpec::new(["p"])), &ctx);
        let err = int.record_value("p", &Assignment::any(), 2.5).await.unwrap_err();
        assert!(err.to_string().contains("\"int\""));

        let int_with_accuracy = metric(MetricDefinition::int("i2", NumberSpec::new(["p"]).with_accuracy(1.0)), &ctx);
        int_with_accuracy.record_value("p", &Assignment::any(), 2.5).await.unwrap();
        assert_eq!(values(&ctx, "i2", &Assignment::any()).await, vec![2.0]);
    }

    #[tokio::test]
    async fn test_unhandled_points() {
        let (ctx, _) = context();
        let m = metric(
            MetricDefinition::int("m", NumberSpec::new(["p"]).with_const_value(1.0))
                .with_delete_snapshots_events(["reset"]),
            &ctx,
        );

        assert!(matches!(
            m.record("other", &Assignment::any()).await,
            Err(MetricsError::UnhandledEventPoint { kind: "RecordPoint", .. })
        ));
        assert!(matches!(
            m.clear("other").await,
            Err(MetricsError::UnhandledEventPoint { kind: "ClearPoint", .. })
        ));
    }

    #[tokio::test]
    async fn test_clear_deletes_all_assignments() {
        let (ctx, _) = context();
        let m = metric(
            MetricDefinition::int("m", NumberSpec::new(["p"]).with_const_value(1.0))
                .with_assignment(&[AssignmentOption::Execution])
                .with_delete_snapshots_events(["reset"]),
            &ctx,
        );
        m.record("p", &Assignment::any().with_execution(1)).await.unwrap();
        m.record("p", &Assignment::any().with_execution(2)).await.unwrap();

        m.clear("reset").await.unwrap();
        assert!(values(&ctx, "m", &Assignment::any()).await.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_non_number_definition() {
        let (ctx, _) = context();
        let err = NumberMetric::new(
            Arc::new(MetricDefinition::meta(
                "meta",
                goalpath_core::MetaSpec::new("x", ["p"]),
            )),
            ctx,
        )
        .unwrap_err();
        assert!(matches!(err, MetricsError::Internal(_)));
    }
}
