//! Metric collection and aggregation for goalpath.
//!
//! Metrics are registered from [`MetricDefinition`](goalpath_core::MetricDefinition)s
//! in dependency order and subscribe to named record and clear points. The
//! [`MetricService`] routes fired points to the subscribed metrics, which
//! compute snapshots and persist them through a
//! [`MetricsStore`](goalpath_core::MetricsStore).
//!
//! ```no_run
//! use goalpath_core::{Assignment, MetricDefinition, NumberSpec, SystemClock};
//! use goalpath_metrics::MetricService;
//! use goalpath_storage::{KvMetricsStore, MemoryStorage};
//! use std::sync::Arc;
//!
//! # async fn example() -> goalpath_core::Result<()> {
//! let store = Arc::new(KvMetricsStore::new(Arc::new(MemoryStorage::new())));
//! let mut service = MetricService::new(store, Arc::new(SystemClock));
//! service.register(&MetricDefinition::int("starts", NumberSpec::new(["workflowStart"]).with_const_value(1.0)))?;
//!
//! service.record("workflowStart", &Assignment::any()).await?;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod catalog;
pub mod export;
pub mod factory;
pub mod id_generator;
pub mod metric;
pub mod registry;
pub mod service;

pub use catalog::default_definitions;
pub use export::ExportDocument;
pub use factory::MetricFactory;
pub use id_generator::MetricIdGenerator;
pub use metric::{DurationMetric, MetaMetric, Metric, MetricContext, MetricHandler, NumberMetric};
pub use registry::MetricRegistry;
pub use service::{DispatchReport, MetricService};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::metric::{Metric, MetricHandler};
    pub use crate::registry::MetricRegistry;
    pub use crate::service::{DispatchReport, MetricService};
    pub use goalpath_core::prelude::*;
}
