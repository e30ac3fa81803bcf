use super::{ensure_record_point, update_snapshots, verify_and_trim_assignment, MetricContext, MetricHandler};
use async_trait::async_trait;
use goalpath_core::time::trim_duration;
use goalpath_core::{
    Assignment, DurationSpec, HandleIncomplete, MetricDefinition, MetricKind, MetricsError, Result, TimestampMillis,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Metric measuring the time between a start and a stop point.
///
/// Pending start times are kept per assignment in the store, so a measurement
/// survives a restart between start and stop.
#[derive(Debug)]
pub struct DurationMetric {
    definition: Arc<MetricDefinition>,
    spec: DurationSpec,
    ctx: MetricContext,
}

impl DurationMetric {
    pub fn new(definition: Arc<MetricDefinition>, ctx: MetricContext) -> Result<Self> {
        let MetricKind::Duration(spec) = &definition.kind else {
            return Err(MetricsError::internal(format!(
                "Duration metric cannot be built from a {} definition",
                definition.type_name()
            )));
        };
        let spec = spec.clone();
        Ok(Self { definition, spec, ctx })
    }

    async fn record_stop(
        &self,
        start_time: Option<TimestampMillis>,
        assignment: &Assignment,
        now: TimestampMillis,
    ) -> Result<()> {
        let name = &self.definition.name;
        let start_time = start_time.ok_or_else(|| {
            MetricsError::invalid_value(
                name,
                format!("No start time recorded for assignment {}", assignment),
            )
        })?;
        self.ctx.store.clear_start_time(name, assignment).await?;

        let elapsed = now - start_time;
        if elapsed < 0 {
            warn!(metric = %name, elapsed, "Clock went backwards since the start point, recording 0");
        }
        let duration = trim_duration(elapsed.max(0) as f64, self.spec.duration_accuracy);
        let at = self.ctx.clock.now();
        update_snapshots(&self.definition, self.ctx.store.as_ref(), assignment, duration, false, at).await
    }
}

#[async_trait]
impl MetricHandler for DurationMetric {
    fn definition(&self) -> &MetricDefinition {
        &self.definition
    }

    async fn record(&self, point: &str, assignment: &Assignment) -> Result<()> {
        ensure_record_point(&self.definition, point)?;
        let now = self.ctx.clock.now_millis();
        let assignment = verify_and_trim_assignment(&self.definition, assignment)?;
        let name = &self.definition.name;
        let store = &self.ctx.store;

        let start_time = store.get_start_time(name, &assignment).await?;
        if point == self.spec.record_start {
            if start_time.is_some() {
                debug!(metric = %name, %assignment, handling = ?self.spec.handle_incomplete, "Incomplete measurement");
                match self.spec.handle_incomplete {
                    HandleIncomplete::Ignore => store.clear_start_time(name, &assignment).await?,
                    HandleIncomplete::Truncate => self.record_stop(start_time, &assignment, now).await?,
                }
            }
            store.store_start_time(name, &assignment, now).await
        } else {
            self.record_stop(start_time, &assignment, now).await
        }
    }

    async fn clear(&self, point: &str) -> Result<()> {
        let name = &self.definition.name;
        let deletes = self.definition.delete_snapshots_events.iter().any(|p| p == point);
        let drops_incomplete = self.spec.clear_incomplete_events.iter().any(|p| p == point);
        if !deletes && !drops_incomplete {
            return Err(MetricsError::unhandled_clear_point(name, point));
        }

        if deletes {
            self.ctx.store.delete_snapshots(name).await?;
        }
        if drops_incomplete {
            debug!(metric = %name, point, "Clearing incomplete measurements");
            self.ctx.store.clear_start_time(name, &Assignment::any()).await?;
        }
        Ok(())
    }
}
