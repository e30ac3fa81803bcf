//! Command implementations for the goalpath CLI.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Args;
use goalpath_core::{Assignment, MetricsConfig, SystemClock};
use goalpath_metrics::{default_definitions, DispatchReport, ExportDocument, MetricHandler, MetricService};
use goalpath_storage::{create_storage, KvMetricsStore, StorageConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Assignment fields supplied on the command line.
#[derive(Args, Debug, Clone, Default)]
pub struct AssignmentArgs {
    /// Schedule id
    #[arg(long)]
    pub schedule: Option<u64>,

    /// Workflow id
    #[arg(long)]
    pub workflow: Option<String>,

    /// Workflow version id
    #[arg(long)]
    pub workflow_version: Option<String>,

    /// Execution id
    #[arg(long)]
    pub execution: Option<u64>,

    /// Task id
    #[arg(long)]
    pub task: Option<u64>,
}

impl AssignmentArgs {
    pub fn to_assignment(&self) -> Assignment {
        let mut assignment = Assignment::any();
        if let Some(schedule) = self.schedule {
            assignment = assignment.with_schedule(schedule);
        }
        if let Some(workflow) = &self.workflow {
            assignment = assignment.with_workflow(workflow.clone());
        }
        if let Some(version) = &self.workflow_version {
            assignment = assignment.with_workflow_version(version.clone());
        }
        if let Some(execution) = self.execution {
            assignment = assignment.with_execution(execution);
        }
        if let Some(task) = self.task {
            assignment = assignment.with_task(task);
        }
        assignment
    }
}

/// Loaded configuration plus a service with every metric registered.
pub struct Session {
    pub config: MetricsConfig,
    pub service: MetricService,
}

impl Session {
    /// Load the configuration, open the store and register the metrics.
    ///
    /// An explicit `config_path` must exist; the default location falls back
    /// to built-in defaults.
    pub async fn open(config_path: Option<&Path>) -> Result<Self> {
        let config = match config_path {
            Some(path) => MetricsConfig::load_from_path(path).await?,
            None => MetricsConfig::load_or_default(&MetricsConfig::config_path()?).await?,
        };
        Self::with_config(config).await
    }

    pub async fn with_config(config: MetricsConfig) -> Result<Self> {
        let storage = create_storage(StorageConfig::from_metrics_config(&config)?).await?;
        let store = Arc::new(KvMetricsStore::new(storage));
        let mut service = MetricService::new(store, Arc::new(SystemClock));
        service.set_recording_enabled(config.recording.enabled);

        if config.metrics.is_empty() {
            debug!("No metrics configured, registering the built-in catalog");
            service.register_all(&default_definitions()?)?;
        } else {
            service.register_all(&config.metrics)?;
        }
        info!(metrics = service.registry().len(), "Metrics registered");

        Ok(Self { config, service })
    }
}

/// Registered metrics, one per line, or a JSON array.
pub fn list_metrics(session: &Session, all: bool, json: bool) -> Result<String> {
    let registry = session.service.registry();
    let metrics: Vec<_> = registry
        .metrics()
        .iter()
        .filter(|metric| all || !metric.definition().private)
        .collect();

    if json {
        let definitions: Vec<_> = metrics.iter().map(|metric| metric.definition()).collect();
        return serde_json::to_string_pretty(&definitions).context("Failed to serialize metric definitions");
    }

    let lines: Vec<String> = metrics
        .iter()
        .map(|metric| {
            let definition = metric.definition();
            let visibility = if definition.private { " (private)" } else { "" };
            format!("{:<8} {}{}", definition.type_name(), definition.name, visibility)
        })
        .collect();
    Ok(lines.join("\n"))
}

/// Fire a record point, with a value if given.
pub async fn record_event(
    session: &Session,
    point: &str,
    assignment: &Assignment,
    value: Option<f64>,
) -> Result<DispatchReport> {
    let report = match value {
        Some(value) => session.service.record_value(point, assignment, value).await?,
        None => session.service.record(point, assignment).await?,
    };
    Ok(report)
}

/// Summary line of a dispatch.
pub fn describe_report(point: &str, report: &DispatchReport) -> String {
    let mut summary = format!(
        "{}: {} handler(s) ran, {} failed, {} skipped",
        point,
        report.attempted,
        report.failed.len(),
        report.skipped
    );
    for (metric, err) in &report.failed {
        summary.push_str(&format!("\n  {}: {}", metric, err));
    }
    summary
}

/// Export the public snapshots as JSON, to `output` if given.
pub async fn export_snapshots(session: &Session, output: Option<&Path>) -> Result<String> {
    let document = ExportDocument::collect(&session.service, Utc::now()).await?;
    let json = document.to_json()?;
    if let Some(path) = output {
        tokio::fs::write(path, &json)
            .await
            .with_context(|| format!("Failed to write export to {}", path.display()))?;
        info!(path = %path.display(), snapshots = document.snapshots.len(), "Export written");
    }
    Ok(json)
}

/// Write the default configuration. Refuses to overwrite unless `force`.
pub async fn init_config(path: Option<PathBuf>, force: bool) -> Result<PathBuf> {
    let path = match path {
        Some(path) => path,
        None => MetricsConfig::config_path()?,
    };
    if !force && tokio::fs::try_exists(&path).await.unwrap_or(false) {
        anyhow::bail!("{} already exists, use --force to overwrite", path.display());
    }
    MetricsConfig::default().save_to_path(&path).await?;
    Ok(path)
}
