//! Built-in metric catalog for workflow execution and scheduling.
//!
//! Registered when the configuration does not list any metrics. Every metric
//! name is prefixed with its catalog id, e.g. `[m1] Workflow executions per
//! workflow`; meta references are written with the plain name and resolved
//! to the prefixed one.

use goalpath_core::{
    AggSpec, AggregateFunction, AggregateTime, AssignmentOption, DurationAccuracy, DurationSpec, DurationUnit,
    HandleIncomplete, MetaSpec, MetricDefinition, MetricKind, MetricsError, NumberSpec, Result, SnapshotLimit,
};
use std::collections::HashMap;

/// Record points fired by the workflow engine.
pub mod points {
    /// Execution of a workflow starts. Assignment: workflow, workflow version, execution
    pub const WORKFLOW_START: &str = "workflowStart";
    /// All required tasks of the execution are completed
    pub const WORKFLOW_END: &str = "workflowEnd";
    /// The execution was cancelled before it was finished
    pub const WORKFLOW_ABORT: &str = "workflowAbort";
    /// A reminder is due, whether or not a reminder dialog is visible. Adds task to the assignment.
    pub const NOTIFICATION_REMINDER: &str = "notificationReminder";
    /// The user confirmed the reminder dialog
    pub const REMINDER_ACCEPT: &str = "reminderAccept";
    /// A block was completed after a reminder was confirmed within it
    pub const BLOCK_ACCEPT_WITH_ACCEPTED_REMINDER: &str = "blockAccept_withAcceptedReminder";
    /// Assignment: schedule
    pub const SCHEDULE_START: &str = "scheduleStart";
    pub const SCHEDULE_ABORT: &str = "scheduleAbort";
    /// Value: scheduled instances of one workflow. Assignment: schedule, workflow
    pub const SCHEDULE_START_NUM_INSTANCES_WORKFLOW: &str = "scheduleStart_numInstancesWorkflow";
    /// Value: completed instances of one workflow. Assignment: schedule, workflow
    pub const SCHEDULE_WORKFLOW_END_NUM_INSTANCES_WORKFLOW: &str = "scheduleWorkflowEnd_numInstancesWorkflow";
    /// Value: instances completed by the schedule. Assignment: schedule
    pub const SCHEDULE_END_NUM_INSTANCES: &str = "scheduleEnd_numInstances";
    /// Value: speech speed index
    pub const WORKFLOW_START_TTS_SPEED: &str = "workflowStart_ttsSpeed";
    pub const WORKFLOW_END_WITH_TTS: &str = "workflowEnd_withTTS";
    pub const WORKFLOW_ABORT_WITH_TTS: &str = "workflowAbort_withTTS";
    pub const WORKFLOW_END_WITHOUT_TTS: &str = "workflowEnd_withoutTTS";
    pub const WORKFLOW_ABORT_WITHOUT_TTS: &str = "workflowAbort_withoutTTS";
    /// Value: id of the task active when the execution was aborted
    pub const WORKFLOW_ABORT_TASK: &str = "workflowAbort_task";
    /// A block became the current block. Assignment includes the task.
    pub const BLOCK_ENTER: &str = "blockEnter";
    pub const BLOCK_LEAVE: &str = "blockLeave";

    /// Record point for the start of a task of the given kind.
    pub fn task_start(image: bool, text: bool, tts: bool) -> String {
        format!("taskStart_{}", task_flags(image, text, tts))
    }

    /// Record point for the end of a task of the given kind.
    pub fn task_end(image: bool, text: bool, tts: bool) -> String {
        format!("taskEnd_{}", task_flags(image, text, tts))
    }

    fn task_flags(image: bool, text: bool, tts: bool) -> String {
        let flag = |set: bool| if set { '+' } else { '-' };
        format!("({}Image,{}Text,{}TTS)", flag(image), flag(text), flag(tts))
    }
}

use points::*;

const WORKFLOW: &[AssignmentOption] = &[AssignmentOption::Workflow];
const EXECUTION: &[AssignmentOption] = &[AssignmentOption::Workflow, AssignmentOption::Execution];
const TASK: &[AssignmentOption] = &[AssignmentOption::Workflow, AssignmentOption::Execution, AssignmentOption::Task];
const WORKFLOW_VERSION: &[AssignmentOption] = &[AssignmentOption::Workflow, AssignmentOption::WorkflowVersion];
const SCHEDULE_WORKFLOW: &[AssignmentOption] = &[AssignmentOption::Schedule, AssignmentOption::Workflow];

fn sum(time: AggregateTime) -> AggSpec {
    AggSpec::new(AggregateFunction::Sum, time)
}

fn seconds() -> DurationAccuracy {
    DurationAccuracy(1.0, DurationUnit::Seconds)
}

/// Counter incremented at `point`, summed over `time`.
fn counter(name: &str, point: &str, assignment: &[AssignmentOption], time: AggregateTime) -> MetricDefinition {
    let snapshots = match time {
        AggregateTime::All => SnapshotLimit::Bounded(1),
        _ => SnapshotLimit::Unbounded,
    };
    MetricDefinition::int(name, NumberSpec::new([point]).with_const_value(1.0))
        .with_assignment(assignment)
        .with_snapshots(snapshots)
        .with_agg(sum(time))
}

/// Average time spent on tasks of one kind, per workflow version.
fn task_time(name: &str, image: bool, text: bool, tts: bool) -> MetricDefinition {
    MetricDefinition::duration(
        name,
        DurationSpec::new(task_start(image, text, tts), task_end(image, text, tts), HandleIncomplete::Ignore)
            .with_clear_incomplete_events([WORKFLOW_END, WORKFLOW_ABORT]),
    )
    .with_assignment(WORKFLOW_VERSION)
    .with_agg(AggSpec::new(AggregateFunction::Average, AggregateTime::All))
}

fn catalog() -> Vec<(&'static str, MetricDefinition)> {
    vec![
        ("m1", counter("Workflow executions per workflow", WORKFLOW_START, WORKFLOW, AggregateTime::All)),
        ("m2", counter("Workflow executions per workflow per week", WORKFLOW_START, WORKFLOW, AggregateTime::Week)),
        ("m2a", counter("Workflow executions per workflow per day", WORKFLOW_START, WORKFLOW, AggregateTime::Day)),
        ("m3", counter("Completed workflow executions per workflow", WORKFLOW_END, WORKFLOW, AggregateTime::All)),
        (
            "m4",
            counter("Completed workflow executions per workflow per week", WORKFLOW_END, WORKFLOW, AggregateTime::Week),
        ),
        (
            "m4a",
            counter("Completed workflow executions per workflow per day", WORKFLOW_END, WORKFLOW, AggregateTime::Day),
        ),
        ("m5", counter("Aborted workflow executions per workflow", WORKFLOW_ABORT, WORKFLOW, AggregateTime::All)),
        (
            "m6",
            counter("Aborted workflow executions per workflow per week", WORKFLOW_ABORT, WORKFLOW, AggregateTime::Week),
        ),
        (
            "m6a",
            counter("Aborted workflow executions per workflow per day", WORKFLOW_ABORT, WORKFLOW, AggregateTime::Day),
        ),
        (
            "m7",
            MetricDefinition::duration(
                "Time per completed workflow execution",
                DurationSpec::new(WORKFLOW_START, WORKFLOW_END, HandleIncomplete::Ignore)
                    .with_duration_accuracy(seconds())
                    .with_clear_incomplete_events([WORKFLOW_ABORT, WORKFLOW_START]),
            )
            .with_assignment(EXECUTION)
            .with_snapshots(SnapshotLimit::Unbounded),
        ),
        (
            "m8",
            MetricDefinition::duration(
                "Time per aborted workflow execution",
                DurationSpec::new(WORKFLOW_START, WORKFLOW_ABORT, HandleIncomplete::Ignore)
                    .with_duration_accuracy(seconds())
                    .with_clear_incomplete_events([WORKFLOW_END, WORKFLOW_START]),
            )
            .with_assignment(EXECUTION)
            .with_snapshots(SnapshotLimit::Unbounded),
        ),
        ("m9", counter("Reminders per workflow execution", NOTIFICATION_REMINDER, EXECUTION, AggregateTime::All)),
        (
            "m9c_private",
            MetricDefinition::int(
                "Reminders per task per workflow execution",
                NumberSpec::new([NOTIFICATION_REMINDER, BLOCK_ENTER])
                    .with_const_value_map([(NOTIFICATION_REMINDER, 1.0), (BLOCK_ENTER, 0.0)]),
            )
            .private()
            .with_delete_snapshots_events([WORKFLOW_END, WORKFLOW_ABORT])
            .with_assignment(TASK)
            .with_agg(sum(AggregateTime::All)),
        ),
        (
            "m9a",
            MetricDefinition::meta(
                "Minimum reminders per task per workflow execution",
                MetaSpec::new("Reminders per task per workflow execution", [NOTIFICATION_REMINDER, BLOCK_LEAVE]),
            )
            .with_assignment(EXECUTION)
            .with_agg(AggSpec::new(AggregateFunction::Min, AggregateTime::All)),
        ),
        (
            "m9b",
            MetricDefinition::meta(
                "Maximum reminders per task per workflow execution",
                MetaSpec::new("Reminders per task per workflow execution", [NOTIFICATION_REMINDER, BLOCK_LEAVE]),
            )
            .with_assignment(EXECUTION)
            .with_agg(AggSpec::new(AggregateFunction::Max, AggregateTime::All)),
        ),
        (
            "m10",
            MetricDefinition::duration(
                "Average time between confirming the last reminder and completing a task per workflow execution",
                DurationSpec::new(REMINDER_ACCEPT, BLOCK_ACCEPT_WITH_ACCEPTED_REMINDER, HandleIncomplete::Ignore)
                    .with_duration_accuracy(seconds())
                    .with_clear_incomplete_events([WORKFLOW_END, WORKFLOW_ABORT]),
            )
            .with_export_order()
            .with_assignment(EXECUTION)
            .with_agg(
                AggSpec::new(AggregateFunction::Average, AggregateTime::All).with_duration_accuracy(seconds()),
            ),
        ),
        (
            "m11_private",
            MetricDefinition::int(
                "Confirmed reminders per task per workflow execution",
                NumberSpec::new([REMINDER_ACCEPT, BLOCK_ENTER])
                    .with_const_value_map([(REMINDER_ACCEPT, 1.0), (BLOCK_ENTER, 0.0)]),
            )
            .private()
            .with_delete_snapshots_events([WORKFLOW_END, WORKFLOW_ABORT])
            .with_assignment(TASK)
            .with_snapshots(SnapshotLimit::Unbounded)
            .with_agg(sum(AggregateTime::All)),
        ),
        (
            "m11",
            MetricDefinition::meta(
                "Average confirmed reminders per task per workflow execution",
                MetaSpec::new(
                    "Confirmed reminders per task per workflow execution",
                    [REMINDER_ACCEPT, BLOCK_ENTER],
                ),
            )
            .with_export_order()
            .with_assignment(EXECUTION)
            .with_agg(AggSpec::new(AggregateFunction::Average, AggregateTime::All)),
        ),
        ("m12", counter("Started schedules per week", SCHEDULE_START, &[], AggregateTime::Week)),
        ("m13", counter("Aborted schedules per week", SCHEDULE_ABORT, &[], AggregateTime::Week)),
        (
            "m14",
            MetricDefinition::int(
                "Instances of a workflow added to a started schedule",
                NumberSpec::new([SCHEDULE_START_NUM_INSTANCES_WORKFLOW]),
            )
            .with_assignment(SCHEDULE_WORKFLOW)
            .with_snapshots(SnapshotLimit::Unbounded),
        ),
        (
            "m15",
            MetricDefinition::int(
                "Completed instances of a workflow in a schedule",
                NumberSpec::new([SCHEDULE_WORKFLOW_END_NUM_INSTANCES_WORKFLOW]),
            )
            .with_assignment(SCHEDULE_WORKFLOW),
        ),
        (
            "m16",
            MetricDefinition::int(
                "Workflow instances per completed schedule",
                NumberSpec::new([SCHEDULE_END_NUM_INSTANCES]),
            )
            .with_assignment(&[AssignmentOption::Schedule])
            .with_snapshots(SnapshotLimit::Unbounded),
        ),
        (
            "m17",
            MetricDefinition::float(
                "Average speech output speed in workflow executions",
                NumberSpec::new([WORKFLOW_START_TTS_SPEED]),
            )
            .with_agg(AggSpec::new(AggregateFunction::Average, AggregateTime::All)),
        ),
        (
            "m18",
            counter("Completed workflow executions with speech output", WORKFLOW_END_WITH_TTS, &[], AggregateTime::All),
        ),
        (
            "m19",
            counter("Aborted workflow executions with speech output", WORKFLOW_ABORT_WITH_TTS, &[], AggregateTime::All),
        ),
        (
            "m20",
            counter(
                "Completed workflow executions without speech output",
                WORKFLOW_END_WITHOUT_TTS,
                &[],
                AggregateTime::All,
            ),
        ),
        (
            "m21",
            counter(
                "Aborted workflow executions without speech output",
                WORKFLOW_ABORT_WITHOUT_TTS,
                &[],
                AggregateTime::All,
            ),
        ),
        (
            "m22",
            MetricDefinition::int(
                "Task at which an aborted workflow execution was aborted",
                NumberSpec::new([WORKFLOW_ABORT_TASK]),
            )
            .with_export_order()
            .with_assignment(EXECUTION)
            .with_snapshots(SnapshotLimit::Unbounded),
        ),
        (
            "m23",
            task_time("Average time for tasks with image, without text, without speech per workflow version", true, false, false),
        ),
        (
            "m24",
            task_time("Average time for tasks with image, with text, without speech per workflow version", true, true, false),
        ),
        (
            "m25",
            task_time("Average time for tasks without image, with text, without speech per workflow version", false, true, false),
        ),
        (
            "m26",
            task_time("Average time for tasks with image, without text, with speech per workflow version", true, false, true),
        ),
        (
            "m27",
            task_time("Average time for tasks with image, with text, with speech per workflow version", true, true, true),
        ),
        (
            "m28",
            task_time("Average time for tasks without image, with text, with speech per workflow version", false, true, true),
        ),
    ]
}

/// Definitions of the built-in catalog, in registration order.
///
/// # Errors
///
/// [`MetricsError::InvalidDefinition`] if two catalog entries share a name or
/// a meta metric references a name outside the catalog.
pub fn default_definitions() -> Result<Vec<MetricDefinition>> {
    let mut entries = catalog();

    let mut prefixed: HashMap<String, String> = HashMap::new();
    for (id, definition) in &mut entries {
        let name = format!("[{}] {}", id, definition.name);
        if prefixed.insert(definition.name.clone(), name.clone()).is_some() {
            return Err(MetricsError::invalid_definition(
                &definition.name,
                "Found duplicate name in the metric catalog.",
            ));
        }
        definition.name = name;
    }

    let mut definitions = Vec::with_capacity(entries.len());
    for (_, mut definition) in entries {
        if let MetricKind::Meta(spec) = &mut definition.kind {
            let Some(reference) = prefixed.get(&spec.meta_reference) else {
                return Err(MetricsError::invalid_definition(
                    &definition.name,
                    format!("Referenced metric \"{}\" does not exist.", spec.meta_reference),
                ));
            };
            spec.meta_reference = reference.clone();
        }
        definitions.push(definition);
    }
    Ok(definitions)
}
