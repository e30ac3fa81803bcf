//! Registry of metrics and their event subscriptions.
//!
//! Metrics are registered once at startup, in dependency order. The registry
//! keeps its own copy of every definition and indexes each metric under the
//! record points and clear points it declares. The subscription order of a
//! point is the order its handlers fire in.

use crate::factory::MetricFactory;
use crate::metric::{Metric, MetricHandler};
use goalpath_core::{EventType, MetricDefinition, MetricsError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Name-keyed registry of metric instances.
pub struct MetricRegistry {
    factory: MetricFactory,
    /// Registration order
    metrics: Vec<Arc<Metric>>,
    by_name: HashMap<String, Arc<Metric>>,
    record_subscribers: HashMap<String, Vec<Arc<Metric>>>,
    clear_subscribers: HashMap<String, Vec<Arc<Metric>>>,
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.metrics.iter().map(|m| m.name()).collect();
        f.debug_struct("MetricRegistry").field("metrics", &names).finish()
    }
}

impl MetricRegistry {
    pub fn new(factory: MetricFactory) -> Self {
        Self {
            factory,
            metrics: Vec::new(),
            by_name: HashMap::new(),
            record_subscribers: HashMap::new(),
            clear_subscribers: HashMap::new(),
        }
    }

    pub fn factory(&self) -> &MetricFactory {
        &self.factory
    }

    /// Register a metric for `definition`.
    ///
    /// The definition is copied; later changes to the caller's value have no
    /// effect. On error the registry is left unchanged.
    ///
    /// # Errors
    ///
    /// - [`MetricsError::InvalidDefinition`] if the definition is not valid
    /// - [`MetricsError::DuplicateMetric`] if the name is taken
    /// - [`MetricsError::UnfulfilledDependency`] listing every unregistered dependency
    /// - [`MetricsError::DependencyMismatch`] if a dependency is not acceptable
    pub fn register(&mut self, definition: &MetricDefinition) -> Result<()> {
        let metric = self.factory.create(definition.clone())?;
        let name = metric.name().to_string();
        if self.by_name.contains_key(&name) {
            return Err(MetricsError::duplicate_metric(name));
        }

        let dependencies = metric.dependencies();
        let missing: Vec<String> = dependencies
            .iter()
            .filter(|dependency| !self.by_name.contains_key(*dependency))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(MetricsError::unfulfilled_dependency(name, missing));
        }
        let dependency_definitions: Vec<&MetricDefinition> = dependencies
            .iter()
            .filter_map(|dependency| self.by_name.get(dependency))
            .map(|dependency| dependency.definition())
            .collect();
        metric.verify_dependency_definitions(&dependency_definitions)?;

        let metric = Arc::new(metric);
        for point in metric.record_points() {
            self.record_subscribers.entry(point).or_default().push(metric.clone());
        }
        for point in metric.clear_points() {
            self.clear_subscribers.entry(point).or_default().push(metric.clone());
        }
        self.by_name.insert(name.clone(), metric.clone());
        self.metrics.push(metric);

        debug!(metric = %name, dependencies = ?dependencies, "Registered metric");
        Ok(())
    }

    pub fn is_metric_registered(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// # Errors
    ///
    /// [`MetricsError::UnknownMetric`] if no metric of that name is registered.
    pub fn get_metric(&self, name: &str) -> Result<&Arc<Metric>> {
        self.by_name.get(name).ok_or_else(|| MetricsError::unknown_metric(name))
    }

    /// Metrics subscribed to `event_name`, in subscription order.
    pub fn get_metrics_for_event_point(&self, event_name: &str, event_type: EventType) -> Vec<Arc<Metric>> {
        let subscribers = match event_type {
            EventType::Record => &self.record_subscribers,
            EventType::Clear => &self.clear_subscribers,
        };
        subscribers.get(event_name).cloned().unwrap_or_default()
    }

    /// Names of the non-private metrics, in registration order.
    pub fn get_public_metric_names(&self) -> Vec<String> {
        self.metrics
            .iter()
            .filter(|metric| !metric.definition().private)
            .map(|metric| metric.name().to_string())
            .collect()
    }

    /// Every registered metric, in registration order.
    pub fn metrics(&self) -> &[Arc<Metric>] {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
