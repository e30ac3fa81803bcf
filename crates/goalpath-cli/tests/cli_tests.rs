//! Command tests against a file-backed store in a temporary directory.

use goalpath_cli::commands::{self, AssignmentArgs, Session};
use goalpath_core::{Assignment, MetricDefinition, MetricsConfig, NumberSpec, StorageBackend};
use std::path::Path;
use tempfile::TempDir;

fn file_config(dir: &Path) -> MetricsConfig {
    let mut config = MetricsConfig::default();
    config.storage.backend = StorageBackend::File;
    config.storage.path = Some(dir.join("metrics.json"));
    config
}

fn workflow(id: &str) -> Assignment {
    AssignmentArgs {
        workflow: Some(id.to_string()),
        execution: Some(1),
        ..Default::default()
    }
    .to_assignment()
}

#[test]
fn test_assignment_args_only_set_given_fields() {
    let args = AssignmentArgs {
        schedule: Some(4),
        task: Some(2),
        ..Default::default()
    };
    assert_eq!(args.to_assignment(), Assignment::any().with_schedule(4).with_task(2));
    assert_eq!(AssignmentArgs::default().to_assignment(), Assignment::any());
}

#[tokio::test]
async fn test_catalog_registered_without_configured_metrics() {
    let dir = TempDir::new().unwrap();
    let session = Session::with_config(file_config(dir.path())).await.unwrap();

    let public = commands::list_metrics(&session, false, false).unwrap();
    let all = commands::list_metrics(&session, true, false).unwrap();

    assert_eq!(public.lines().count(), 33);
    assert_eq!(all.lines().count(), 35);
    assert!(public.lines().next().unwrap().contains("[m1] Workflow executions per workflow"));
    assert!(all.contains("(private)"));
    assert!(!public.contains("(private)"));
}

#[tokio::test]
async fn test_list_as_json_round_trips_definitions() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(dir.path());
    config.metrics = vec![MetricDefinition::int("starts", NumberSpec::new(["workflowStart"]).with_const_value(1.0))];
    let session = Session::with_config(config.clone()).await.unwrap();

    let json = commands::list_metrics(&session, true, true).unwrap();
    let parsed: Vec<MetricDefinition> = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config.metrics);
}

#[tokio::test]
async fn test_recorded_events_survive_a_new_session() {
    let dir = TempDir::new().unwrap();
    let config = file_config(dir.path());

    {
        let session = Session::with_config(config.clone()).await.unwrap();
        for _ in 0..2 {
            let report = commands::record_event(&session, "workflowStart", &workflow("wf-1"), None)
                .await
                .unwrap();
            assert!(report.is_success());
            assert!(report.attempted > 0);
        }
    }

    let session = Session::with_config(config).await.unwrap();
    let export_path = dir.path().join("export.json");
    let json = commands::export_snapshots(&session, Some(&export_path)).await.unwrap();
    assert_eq!(tokio::fs::read_to_string(&export_path).await.unwrap(), json);

    let document: serde_json::Value = serde_json::from_str(&json).unwrap();
    let executions: Vec<_> = document["snapshots"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|s| s["metric_name"] == "[m1] Workflow executions per workflow")
        .collect();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0]["value"], 2.0);
}

#[tokio::test]
async fn test_record_with_value_and_report_summary() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(dir.path());
    config.metrics = vec![MetricDefinition::float("speed", NumberSpec::new(["ttsSpeed"]))];
    let session = Session::with_config(config).await.unwrap();

    let report = commands::record_event(&session, "ttsSpeed", &Assignment::any(), Some(-1.5))
        .await
        .unwrap();
    assert_eq!(
        commands::describe_report("ttsSpeed", &report),
        "ttsSpeed: 1 handler(s) ran, 0 failed, 0 skipped"
    );

    let report = commands::record_event(&session, "ttsSpeed", &Assignment::any(), None)
        .await
        .unwrap();
    assert!(!report.is_success());
    let summary = commands::describe_report("ttsSpeed", &report);
    assert!(summary.contains("1 failed"));
    assert!(summary.contains("speed"));
}

#[tokio::test]
async fn test_recording_disabled_in_config_skips_handlers() {
    let dir = TempDir::new().unwrap();
    let mut config = file_config(dir.path());
    config.recording.enabled = false;
    let session = Session::with_config(config).await.unwrap();

    let report = commands::record_event(&session, "workflowStart", &workflow("wf-1"), None)
        .await
        .unwrap();
    assert_eq!(report.attempted, 0);
    assert!(report.skipped > 0);
}

#[tokio::test]
async fn test_init_writes_config_and_refuses_overwrite() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.toml");

    let written = commands::init_config(Some(path.clone()), false).await.unwrap();
    assert_eq!(written, path);
    assert_eq!(MetricsConfig::load_from_path(&path).await.unwrap(), MetricsConfig::default());

    let err = commands::init_config(Some(path.clone()), false).await.unwrap_err();
    assert!(err.to_string().contains("--force"));
    commands::init_config(Some(path), true).await.unwrap();
}

#[tokio::test]
async fn test_open_reads_explicit_config_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("metrics.toml");
    file_config(dir.path()).save_to_path(&path).await.unwrap();

    let session = Session::open(Some(&path)).await.unwrap();
    assert_eq!(session.config.storage.path, Some(dir.path().join("metrics.json")));

    assert!(Session::open(Some(&dir.path().join("missing.toml"))).await.is_err());
}

#[tokio::test]
async fn test_execution_ids_continue_across_sessions() {
    let dir = TempDir::new().unwrap();
    let config = file_config(dir.path());

    let first = {
        let session = Session::with_config(config.clone()).await.unwrap();
        session.service.get_new_execution_id("wf-1").await.unwrap()
    };
    let session = Session::with_config(config).await.unwrap();
    let second = session.service.get_new_execution_id("wf-1").await.unwrap();
    let other = session.service.get_new_execution_id("wf-2").await.unwrap();

    assert_eq!(second, first + 1);
    assert_eq!(other, first);
}
