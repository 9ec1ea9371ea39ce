//! Per-execution mutable state: pending activities and user timers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{EMPTY_EVENT_ID, EMPTY_TIMER_TASK_ID};

/// A scheduled activity that has not completed yet, keyed by `schedule_id`.
///
/// Timeouts are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityInfo {
    /// Event id of the `ActivityTaskScheduled` event.
    pub schedule_id: i64,
    /// Event id of the `ActivityTaskStarted` event, or [`EMPTY_EVENT_ID`].
    pub started_id: i64,
    /// Caller-assigned activity id.
    pub activity_id: String,
    /// Schedule-to-start timeout.
    pub schedule_to_start_timeout: i32,
    /// Schedule-to-close timeout.
    pub schedule_to_close_timeout: i32,
    /// Start-to-close timeout.
    pub start_to_close_timeout: i32,
    /// Heartbeat timeout; non-positive means no heartbeat is required.
    pub heartbeat_timeout: i32,
    /// Whether cancellation has been requested.
    pub cancel_requested: bool,
    /// Event id of the cancel request, or [`EMPTY_EVENT_ID`].
    pub cancel_request_id: i64,
}

impl ActivityInfo {
    /// A freshly scheduled activity: not started, no cancel requested, no timeouts.
    pub fn scheduled(schedule_id: i64, activity_id: impl Into<String>) -> Self {
        Self {
            schedule_id,
            started_id: EMPTY_EVENT_ID,
            activity_id: activity_id.into(),
            schedule_to_start_timeout: 0,
            schedule_to_close_timeout: 0,
            start_to_close_timeout: 0,
            heartbeat_timeout: 0,
            cancel_requested: false,
            cancel_request_id: EMPTY_EVENT_ID,
        }
    }

    /// Returns `true` once a worker has picked the activity up.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started_id != EMPTY_EVENT_ID
    }
}

/// A pending user timer, keyed by `timer_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerInfo {
    /// Caller-assigned timer id, unique among pending timers.
    pub timer_id: String,
    /// Absolute fire time.
    pub expiry_time: DateTime<Utc>,
    /// Event id of the `TimerStarted` event.
    pub started_id: i64,
    /// Persisted timer task firing this timer, or [`EMPTY_TIMER_TASK_ID`].
    pub task_id: i64,
}

impl TimerInfo {
    /// A timer with no persisted task yet.
    pub fn new(timer_id: impl Into<String>, expiry_time: DateTime<Utc>, started_id: i64) -> Self {
        Self {
            timer_id: timer_id.into(),
            expiry_time,
            started_id,
            task_id: EMPTY_TIMER_TASK_ID,
        }
    }

    /// Returns `true` if a persisted timer task already backs this timer.
    #[must_use]
    pub fn has_task(&self) -> bool {
        self.task_id != EMPTY_TIMER_TASK_ID
    }
}

/// Pending activities and timers of one execution as read from the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMutableState {
    /// Pending activities by schedule id.
    pub activity_infos: HashMap<i64, ActivityInfo>,
    /// Pending user timers by timer id.
    pub timer_infos: HashMap<String, TimerInfo>,
}
