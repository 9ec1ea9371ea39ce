//! Shared event-id and task-id sentinels.

/// Event id of the first history event (`WorkflowExecutionStarted`).
pub const FIRST_EVENT_ID: i64 = 1;

/// Placeholder for "no event yet", e.g. an activity that has not started.
pub const EMPTY_EVENT_ID: i64 = -23;

/// Task id of a [`TimerInfo`](crate::TimerInfo) that has no persisted timer task.
pub const EMPTY_TIMER_TASK_ID: i64 = -1;
