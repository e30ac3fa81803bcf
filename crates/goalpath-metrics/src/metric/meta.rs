use super::{delete_snapshots_on, ensure_record_point, update_snapshots, verify_and_trim_assignment, MetricContext, MetricHandler};
use crate::aggregate;
use async_trait::async_trait;
use chrono::Duration;
use goalpath_core::{
    AggSpec, Assignment, MetaSpec, MetricDefinition, MetricKind, MetricSnapshotWithAssignment, MetricsError, Result,
};
use std::sync::Arc;
use tracing::trace;

/// Metric derived from the snapshots of another metric.
#[derive(Debug)]
pub struct MetaMetric {
    definition: Arc<MetricDefinition>,
    spec: MetaSpec,
    ctx: MetricContext,
}

impl MetaMetric {
    pub fn new(definition: Arc<MetricDefinition>, ctx: MetricContext) -> Result<Self> {
        let MetricKind::Meta(spec) = &definition.kind else {
            return Err(MetricsError::internal(format!(
                "Meta metric cannot be built from a {} definition",
                definition.type_name()
            )));
        };
        let spec = spec.clone();
        Ok(Self { definition, spec, ctx })
    }

    async fn selected_snapshots(&self, agg: &AggSpec, assignment: &Assignment) -> Result<Vec<MetricSnapshotWithAssignment>> {
        let reference = &self.spec.meta_reference;
        match agg.time.accuracy() {
            None => self.ctx.store.get_snapshots(reference, assignment).await,
            Some(accuracy) => {
                let start = accuracy.round_down(self.ctx.clock.now());
                let end = start + Duration::milliseconds(accuracy.bucket_millis());
                self.ctx
                    .store
                    .get_snapshots_within_time_frame(reference, assignment, start, end)
                    .await
            }
        }
    }
}

#[async_trait]
impl MetricHandler for MetaMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.definition
    }

    fn verify_dependency_definitions(&self, definitions: &[&MetricDefinition]) -> Result<()> {
        let name = &self.definition.name;
        let reference = &self.spec.meta_reference;
        let [referenced] = definitions else {
            return Err(MetricsError::dependency_mismatch(
                name,
                format!("Expected exactly one dependency definition, got {}", definitions.len()),
            ));
        };
        if &referenced.name != reference {
            return Err(MetricsError::dependency_mismatch(
                name,
                format!(
                    "Expected metric definition for \"{}\", but got definition for \"{}\"",
                    reference, referenced.name
                ),
            ));
        }
        let per_bucket = self.definition.agg.as_ref().is_some_and(|agg| agg.time.accuracy().is_some());
        if per_bucket && !referenced.records_timestamps() {
            return Err(MetricsError::dependency_mismatch(
                name,
                format!(
                    "Meta metric requires timestamps of referenced metric \"{}\", however they are not recorded by it.",
                    reference
                ),
            ));
        }
        Ok(())
    }

    async fn record(&self, point: &str, assignment: &Assignment) -> Result<()> {
        ensure_record_point(&self.definition, point)?;
        let assignment = verify_and_trim_assignment(&self.definition, assignment)?;
        let store = self.ctx.store.as_ref();

        let Some(agg) = &self.definition.agg else {
            let Some(last) = store.get_last_snapshot(&self.spec.meta_reference, &assignment).await? else {
                trace!(metric = %self.definition.name, reference = %self.spec.meta_reference, "Reference has no snapshots yet");
                return Ok(());
            };
            return update_snapshots(&self.definition, store, &assignment, last.snapshot.value, false, self.ctx.clock.now())
                .await;
        };

        let values: Vec<f64> = self
            .selected_snapshots(agg, &assignment)
            .await?
            .into_iter()
            .map(|entry| entry.snapshot.value)
            .collect();
        let value = aggregate::complete(agg.operation, &values);
        update_snapshots(&self.definition, store, &assignment, value, true, self.ctx.clock.now()).await
    }

    async fn clear(&self, point: &str) -> Result<()> {
        delete_snapshots_on(&self.definition, self.ctx.store.as_ref(), point).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::super::NumberMetric;
    use super::*;
    use goalpath_core::{
        AggregateFunction, AggregateTime, AssignmentOption, NumberSpec, SnapshotLimit, TimeAccuracy,
    };

    fn meta(definition: MetricDefinition, ctx: &MetricContext) -> MetaMetric {
        MetaMetric::new(Arc::new(definition), ctx.clone()).unwrap()
    }

    fn raw(definition: MetricDefinition, ctx: &MetricContext) -> NumberMetric {
        NumberMetric::new(Arc::new(definition), ctx.clone()).unwrap()
    }

    fn rating() -> MetricDefinition {
        MetricDefinition::int("rating", NumberSpec::new(["rate"]))
            .private()
            .with_assignment(&[AssignmentOption::Workflow, AssignmentOption::Task])
            .with_snapshots(SnapshotLimit::Unbounded)
    }

    fn task(workflow: &str, id: u64) -> Assignment {
        Assignment::any().with_workflow(workflow).with_task(id)
    }

    #[tokio::test]
    async fn test_copies_last_reference_value() {
        let (ctx, _) = context();
        let source = raw(rating(), &ctx);
        let copy = meta(
            MetricDefinition::meta("last_rating", MetaSpec::new("rating", ["done"]))
                .with_assignment(&[AssignmentOption::Workflow])
                .with_snapshots(SnapshotLimit::Unbounded),
            &ctx,
        );

        copy.record("done", &task("w", 1)).await.unwrap();
        assert!(values(&ctx, "last_rating", &Assignment::any()).await.is_empty());

        source.record_value("rate", &task("w", 1), 3.0).await.unwrap();
        source.record_value("rate", &task("w", 2), 5.0).await.unwrap();
        copy.record("done", &task("w", 2)).await.unwrap();

        assert_eq!(values(&ctx, "last_rating", &Assignment::any()).await, vec![5.0]);
    }

    #[tokio::test]
    async fn test_aggregates_reference_across_extra_fields() {
        let (ctx, _) = context();
        let source = raw(rating(), &ctx);
        let avg = meta(
            MetricDefinition::meta("avg_rating", MetaSpec::new("rating", ["done"]))
                .with_assignment(&[AssignmentOption::Workflow])
                .with_agg(goalpath_core::AggSpec::new(AggregateFunction::Average, AggregateTime::All)),
            &ctx,
        );

        for (id, value) in [(1, 2.0), (2, 4.0), (3, 9.0)] {
            source.record_value("rate", &task("w", id), value).await.unwrap();
        }
        source.record_value("rate", &task("other", 1), 100.0).await.unwrap();
        avg.record("done", &task("w", 3)).await.unwrap();

        assert_eq!(values(&ctx, "avg_rating", &Assignment::any().with_workflow("w")).await, vec![5.0]);

        // recomputed, not folded into the previous aggregate
        source.record_value("rate", &task("w", 4), 5.0).await.unwrap();
        avg.record("done", &task("w", 4)).await.unwrap();
        assert_eq!(values(&ctx, "avg_rating", &Assignment::any().with_workflow("w")).await, vec![5.0]);
    }

    #[tokio::test]
    async fn test_median_over_current_day() {
        let (ctx, clock) = context();
        let source = raw(
            MetricDefinition::float("raw", NumberSpec::new(["p"]))
                .with_snapshots(SnapshotLimit::Unbounded)
                .with_timestamp(TimeAccuracy::Hour),
            &ctx,
        );
        let daily = meta(
            MetricDefinition::meta("daily_median", MetaSpec::new("raw", ["p"]))
                .with_snapshots(SnapshotLimit::Unbounded)
                .with_agg(goalpath_core::AggSpec::new(AggregateFunction::Median, AggregateTime::Day)),
            &ctx,
        );

        source.record_value("p", &Assignment::any(), 100.0).await.unwrap();
        clock.advance_millis(goalpath_core::time::DAY_IN_MILLISECONDS);
        for value in [10.0, 9.0, 1.0] {
            source.record_value("p", &Assignment::any(), value).await.unwrap();
        }
        daily.record("p", &Assignment::any()).await.unwrap();

        assert_eq!(values(&ctx, "daily_median", &Assignment::any()).await, vec![9.0]);
    }

    #[tokio::test]
    async fn test_verify_dependency_definitions() {
        let (ctx, _) = context();
        let per_day = meta(
            MetricDefinition::meta("m", MetaSpec::new("rating", ["p"]))
                .with_agg(goalpath_core::AggSpec::new(AggregateFunction::Sum, AggregateTime::Day)),
            &ctx,
        );
        let other = MetricDefinition::int("other", NumberSpec::new(["p"]));
        let with_timestamps = rating().with_timestamp(TimeAccuracy::Day);

        assert!(per_day.verify_dependency_definitions(&[]).unwrap_err().is_dependency_mismatch());
        assert!(per_day.verify_dependency_definitions(&[&other]).unwrap_err().is_dependency_mismatch());
        assert!(per_day.verify_dependency_definitions(&[&rating()]).unwrap_err().is_dependency_mismatch());
        per_day.verify_dependency_definitions(&[&with_timestamps]).unwrap();

        let copy = meta(MetricDefinition::meta("c", MetaSpec::new("rating", ["p"])), &ctx);
        copy.verify_dependency_definitions(&[&rating()]).unwrap();
    }
}
