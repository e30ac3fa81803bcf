//! Event dispatch from lifecycle events to registered metrics.

use crate::factory::MetricFactory;
use crate::id_generator::MetricIdGenerator;
use crate::metric::{Metric, MetricContext, MetricHandler};
use crate::registry::MetricRegistry;
use goalpath_core::{
    Assignment, Clock, EventType, MetricDefinition, MetricSnapshotExport, MetricsError, MetricsStore, RecordValue,
    Result,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, warn};

/// Outcome of dispatching one event to its subscribers.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Handlers that ran
    pub attempted: usize,
    /// Handlers that failed, with the metric name
    pub failed: Vec<(String, MetricsError)>,
    /// Subscribers not run because recording is disabled
    pub skipped: usize,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn skipped(count: usize) -> Self {
        Self {
            skipped: count,
            ..Self::default()
        }
    }

    fn merge(&mut self, other: DispatchReport) {
        self.attempted += other.attempted;
        self.skipped += other.skipped;
        self.failed.extend(other.failed);
    }
}

/// Routes record and clear points to the metrics subscribed to them.
///
/// Metrics are registered through `&mut self` at startup; afterwards the
/// service is shared behind an `Arc`. Events are handled one at a time in
/// firing order across all concurrent callers; the handlers of one event run
/// as a contiguous group.
pub struct MetricService {
    registry: MetricRegistry,
    ids: MetricIdGenerator,
    recording: AtomicBool,
    recorder: Mutex<()>,
    pending: AtomicUsize,
}

impl std::fmt::Debug for MetricService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricService")
            .field("registry", &self.registry)
            .field("recording", &self.is_recording_enabled())
            .field("pending", &self.pending.load(Ordering::Relaxed))
            .finish()
    }
}

impl MetricService {
    pub fn new(store: Arc<dyn MetricsStore>, clock: Arc<dyn Clock>) -> Self {
        let ids = MetricIdGenerator::new(store.clone());
        let factory = MetricFactory::new(MetricContext::new(store, clock));
        Self {
            registry: MetricRegistry::new(factory),
            ids,
            recording: AtomicBool::new(true),
            recorder: Mutex::new(()),
            pending: AtomicUsize::new(0),
        }
    }

    pub fn register(&mut self, definition: &MetricDefinition) -> Result<()> {
        self.registry.register(definition)
    }

    /// Register definitions in order, stopping at the first failure.
    pub fn register_all<'a>(&mut self, definitions: impl IntoIterator<Item = &'a MetricDefinition>) -> Result<()> {
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    pub fn id_generator(&self) -> &MetricIdGenerator {
        &self.ids
    }

    pub fn set_recording_enabled(&self, enabled: bool) {
        self.recording.store(enabled, Ordering::SeqCst);
    }

    pub fn is_recording_enabled(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }

    pub fn get_public_metric_names(&self) -> Vec<String> {
        self.registry.get_public_metric_names()
    }

    /// Fire `point`: clear handlers subscribed to it first, then record handlers.
    ///
    /// # Errors
    ///
    /// Only for an empty event name. Handler failures are collected in the report.
    pub async fn record(&self, point: &str, assignment: &Assignment) -> Result<DispatchReport> {
        debug!(point, %assignment, recording = self.is_recording_enabled(), "record");
        let (clear, record) = self.subscribers(point)?;
        if !self.is_recording_enabled() {
            return Ok(DispatchReport::skipped(clear.len() + record.len()));
        }

        let _turn = self.enter().await;
        let mut report = Self::dispatch(clear, |metric| async move { metric.clear(point).await }).await;
        report.merge(
            Self::dispatch(record, |metric| async move { metric.record(point, assignment).await })
                .await,
        );
        Ok(report)
    }

    /// Fire `point` with an externally measured value. Only record handlers run.
    pub async fn record_value(&self, point: &str, assignment: &Assignment, value: RecordValue) -> Result<DispatchReport> {
        debug!(point, %assignment, value, recording = self.is_recording_enabled(), "record_value");
        let (_, record) = self.subscribers(point)?;
        if !self.is_recording_enabled() {
            return Ok(DispatchReport::skipped(record.len()));
        }

        let _turn = self.enter().await;
        Ok(Self::dispatch(record, |metric| async move { metric.record_value(point, assignment, value).await }).await)
    }

    pub async fn get_new_execution_id(&self, workflow_id: &str) -> Result<u64> {
        self.ids.get_new_execution_id(workflow_id).await
    }

    pub async fn get_new_schedule_id(&self) -> Result<u64> {
        self.ids.get_new_schedule_id().await
    }

    /// Every stored snapshot of the public metrics.
    pub async fn export_public_snapshots(&self) -> Result<Vec<MetricSnapshotExport>> {
        let names = self.get_public_metric_names();
        self.registry.factory().context().store.export_metric_snapshots(&names).await
    }

    fn subscribers(&self, point: &str) -> Result<(Vec<Arc<Metric>>, Vec<Arc<Metric>>)> {
        if point.trim().is_empty() {
            return Err(MetricsError::invalid_event_type(format!(
                "event point should be a non-empty string, got {:?}",
                point
            )));
        }
        let clear = self.registry.get_metrics_for_event_point(point, EventType::Clear);
        let record = self.registry.get_metrics_for_event_point(point, EventType::Record);
        if clear.is_empty() && record.is_empty() {
            warn!(point, "No metrics are affected by the event point");
        }
        Ok((clear, record))
    }

    /// Wait for the events fired earlier to finish. The returned turn covers
    /// every handler of one event, so events never interleave.
    async fn enter(&self) -> Turn<'_> {
        let pending = PendingEvent::new(&self.pending);
        Turn {
            _guard: self.recorder.lock().await,
            _pending: pending,
        }
    }

    async fn dispatch<F, Fut>(metrics: Vec<Arc<Metric>>, handler: F) -> DispatchReport
    where
        F: Fn(Arc<Metric>) -> Fut,
        Fut: std::future::Future<Output = Result<()>>,
    {
        let mut report = DispatchReport::default();
        for metric in metrics {
            let result = handler(metric.clone()).await;
            report.attempted += 1;
            if let Err(err) = result {
                error!(metric = %metric.name(), error = %err, "Error while processing metric");
                report.failed.push((metric.name().to_string(), err));
            }
        }
        report
    }
}

/// Exclusive right to run handlers, held for the whole event.
struct Turn<'a> {
    _guard: MutexGuard<'a, ()>,
    _pending: PendingEvent<'a>,
}

/// Counts an event from the moment it is fired until its handlers are done.
struct PendingEvent<'a>(&'a AtomicUsize);

impl<'a> PendingEvent<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        let pending = counter.fetch_add(1, Ordering::SeqCst);
        if pending > 0 {
            warn!(pending, "Metric handlers of earlier events are still pending");
        }
        Self(counter)
    }
}

impl Drop for PendingEvent<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
