//! Registration protocol and event point lookups.

use goalpath_core::{
    AggSpec, AggregateFunction, AggregateTime, DurationSpec, EventType, HandleIncomplete, ManualClock,
    MetaSpec, MetricDefinition, MetricsError, NumberSpec,
};
use goalpath_metrics::{Metric, MetricContext, MetricFactory, MetricHandler, MetricRegistry};
use goalpath_storage::{KvMetricsStore, MemoryStorage};
use std::sync::Arc;

fn registry() -> MetricRegistry {
    let store = Arc::new(KvMetricsStore::new(Arc::new(MemoryStorage::new())));
    let ctx = MetricContext::new(store, Arc::new(ManualClock::at_millis(0)));
    MetricRegistry::new(MetricFactory::new(ctx))
}

fn names(metrics: &[Arc<Metric>]) -> Vec<String> {
    metrics.iter().map(|m| m.name().to_string()).collect()
}

fn task_count() -> MetricDefinition {
    MetricDefinition::int("taskCount", NumberSpec::new(["taskCompleted"]).with_const_value(1.0))
        .with_agg(AggSpec::new(AggregateFunction::Sum, AggregateTime::All))
}

fn task_duration() -> MetricDefinition {
    MetricDefinition::meta("taskDuration", MetaSpec::new("taskCount", ["taskCompleted"]))
        .with_delete_snapshots_events(["workflowStarted"])
}

#[test]
fn test_event_point_lookup_follows_subscription_order() {
    let mut registry = registry();
    registry.register(&task_count()).unwrap();
    registry.register(&task_duration()).unwrap();

    assert_eq!(
        names(&registry.get_metrics_for_event_point("taskCompleted", EventType::Record)),
        vec!["taskCount", "taskDuration"]
    );
    assert_eq!(
        names(&registry.get_metrics_for_event_point("workflowStarted", EventType::Clear)),
        vec!["taskDuration"]
    );
    assert!(registry.get_metrics_for_event_point("workflowStarted", EventType::Record).is_empty());
    assert!(registry.get_metrics_for_event_point("unknown", EventType::Clear).is_empty());
}

#[test]
fn test_dependency_must_be_registered_first() {
    let mut registry = registry();
    let err = registry.register(&task_duration()).unwrap_err();

    match &err {
        MetricsError::UnfulfilledDependency { metric, missing } => {
            assert_eq!(metric, "taskDuration");
            assert_eq!(missing, &vec!["taskCount".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("taskCount"));
    assert!(!registry.is_metric_registered("taskDuration"));
    assert!(registry.get_metrics_for_event_point("taskCompleted", EventType::Record).is_empty());

    registry.register(&task_count()).unwrap();
    registry.register(&task_duration()).unwrap();
}

#[test]
fn test_registered_definition_is_isolated_from_caller() {
    let mut registry = registry();
    let mut definition = task_count();
    registry.register(&definition).unwrap();

    definition.private = true;
    definition.name = "renamed".to_string();

    let registered = registry.get_metric("taskCount").unwrap();
    assert_eq!(registered.definition(), &task_count());
    assert!(!registry.is_metric_registered("renamed"));
}

#[test]
fn test_duplicate_registration_leaves_registry_unchanged() {
    let mut registry = registry();
    registry.register(&task_count()).unwrap();

    let twin = MetricDefinition::int("taskCount", NumberSpec::new(["other"]).with_const_value(2.0));
    assert!(registry.register(&twin).unwrap_err().is_duplicate_metric());

    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get_metric("taskCount").unwrap().definition(), &task_count());
    assert!(registry.get_metrics_for_event_point("other", EventType::Record).is_empty());
    assert_eq!(
        names(&registry.get_metrics_for_event_point("taskCompleted", EventType::Record)),
        vec!["taskCount"]
    );
}

#[test]
fn test_public_names_in_registration_order() {
    let mut registry = registry();
    registry
        .register(&MetricDefinition::int("b", NumberSpec::new(["p"])))
        .unwrap();
    registry
        .register(&MetricDefinition::int("hidden", NumberSpec::new(["p"])).private())
        .unwrap();
    registry
        .register(&MetricDefinition::int("a", NumberSpec::new(["p"])))
        .unwrap();

    assert_eq!(registry.get_public_metric_names(), vec!["b".to_string(), "a".to_string()]);
}

#[test]
fn test_unknown_metric_lookup() {
    let registry = registry();
    let err = registry.get_metric("missing").unwrap_err();
    assert!(err.is_unknown_metric());
    assert!(err.to_string().contains("missing"));
}

#[test]
fn test_invalid_definition_aborts_registration() {
    let mut registry = registry();
    let same_points = MetricDefinition::duration("d", DurationSpec::new("x", "x", HandleIncomplete::Ignore));

    assert!(registry.register(&same_points).unwrap_err().is_invalid_definition());
    assert!(registry.is_empty());
}

#[test]
fn test_dependency_mismatch_aborts_registration() {
    let mut registry = registry();
    registry.register(&task_count()).unwrap();

    let weekly = MetricDefinition::meta("weekly", MetaSpec::new("taskCount", ["taskCompleted"]))
        .with_agg(AggSpec::new(AggregateFunction::Sum, AggregateTime::Week));
    assert!(registry.register(&weekly).unwrap_err().is_dependency_mismatch());
    assert!(!registry.is_metric_registered("weekly"));
    assert_eq!(
        names(&registry.get_metrics_for_event_point("taskCompleted", EventType::Record)),
        vec!["taskCount"]
    );
}

#[test]
fn test_event_type_parsing_rejects_unknown_values() {
    assert_eq!("record".parse::<EventType>().unwrap(), EventType::Record);
    assert!(matches!(
        "reset".parse::<EventType>(),
        Err(MetricsError::InvalidEventType(_))
    ));
}
