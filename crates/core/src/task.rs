//! Tasks and task lists.
//!
//! [`Task`] is what callers hand to the store alongside a state change. The
//! store only routes on [`Task::kind`]: transfer tasks land in the transfer
//! queue, timer tasks in the timer stream keyed by [`SequenceId`]. What comes
//! back from reads are the persisted rows ([`TransferTaskInfo`],
//! [`TimerTaskInfo`], [`TaskInfo`]), which also carry the owning execution.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::execution::WorkflowExecution;
use crate::sequence::SequenceId;

/// Which kind of activity timeout fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutType {
    /// Not picked up by a worker in time.
    ScheduleToStart,
    /// Not completed in time, measured from scheduling.
    ScheduleToClose,
    /// Not completed in time, measured from start.
    StartToClose,
    /// Worker stopped heartbeating.
    Heartbeat,
}

impl fmt::Display for TimeoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ScheduleToStart => write!(f, "schedule_to_start"),
            Self::ScheduleToClose => write!(f, "schedule_to_close"),
            Self::StartToClose => write!(f, "start_to_close"),
            Self::Heartbeat => write!(f, "heartbeat"),
        }
    }
}

/// The two kinds of task list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskListType {
    /// Decision tasks, polled by workflow workers.
    Decision,
    /// Activity tasks, polled by activity workers.
    Activity,
}

impl fmt::Display for TaskListType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::Activity => write!(f, "activity"),
        }
    }
}

/// Discriminant of [`Task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Dispatch a decision task.
    Decision,
    /// Dispatch an activity task.
    Activity,
    /// Decision start-to-close timeout.
    DecisionTimeout,
    /// One of the activity timeouts.
    ActivityTimeout,
    /// A user timer fired.
    UserTimer,
}

impl TaskKind {
    /// Returns `true` for kinds persisted in the timer stream.
    #[must_use]
    pub fn is_timer(&self) -> bool {
        matches!(
            self,
            Self::DecisionTimeout | Self::ActivityTimeout | Self::UserTimer
        )
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decision => write!(f, "decision"),
            Self::Activity => write!(f, "activity"),
            Self::DecisionTimeout => write!(f, "decision_timeout"),
            Self::ActivityTimeout => write!(f, "activity_timeout"),
            Self::UserTimer => write!(f, "user_timer"),
        }
    }
}

/// A unit of work written atomically with a workflow state change.
///
/// Transfer variants carry a plain shard sequence number as `task_id`; timer
/// variants carry an encoded [`SequenceId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Transfer: dispatch a decision on `task_list`.
    Decision {
        /// Shard sequence number.
        task_id: i64,
        /// Target task list.
        task_list: String,
        /// Event id of the `DecisionTaskScheduled` event.
        schedule_id: i64,
    },
    /// Transfer: dispatch an activity on `task_list`.
    Activity {
        /// Shard sequence number.
        task_id: i64,
        /// Target task list.
        task_list: String,
        /// Event id of the `ActivityTaskScheduled` event.
        schedule_id: i64,
    },
    /// Timer: decision start-to-close timeout.
    DecisionTimeout {
        /// Encoded [`SequenceId`].
        task_id: i64,
        /// Event id of the decision being timed.
        event_id: i64,
    },
    /// Timer: activity timeout.
    ActivityTimeout {
        /// Encoded [`SequenceId`].
        task_id: i64,
        /// Which timeout this task enforces.
        timeout_type: TimeoutType,
        /// Event id of the activity being timed.
        event_id: i64,
    },
    /// Timer: user timer fired.
    UserTimer {
        /// Encoded [`SequenceId`].
        task_id: i64,
        /// Event id of the `TimerStarted` event.
        event_id: i64,
    },
}

impl Task {
    /// Discriminant.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Decision { .. } => TaskKind::Decision,
            Self::Activity { .. } => TaskKind::Activity,
            Self::DecisionTimeout { .. } => TaskKind::DecisionTimeout,
            Self::ActivityTimeout { .. } => TaskKind::ActivityTimeout,
            Self::UserTimer { .. } => TaskKind::UserTimer,
        }
    }

    /// Task id shared by every variant.
    #[must_use]
    pub fn task_id(&self) -> i64 {
        match self {
            Self::Decision { task_id, .. }
            | Self::Activity { task_id, .. }
            | Self::DecisionTimeout { task_id, .. }
            | Self::ActivityTimeout { task_id, .. }
            | Self::UserTimer { task_id, .. } => *task_id,
        }
    }

    /// Returns `true` for tasks persisted in the timer stream.
    #[must_use]
    pub fn is_timer(&self) -> bool {
        self.kind().is_timer()
    }

    /// Returns `true` for tasks persisted in the transfer queue.
    #[must_use]
    pub fn is_transfer(&self) -> bool {
        !self.is_timer()
    }

    /// Timer key of a timer task.
    #[must_use]
    pub fn sequence_id(&self) -> Option<SequenceId> {
        self.is_timer().then(|| SequenceId::from_raw(self.task_id()))
    }
}

/// A task-list lease: the `(name, task_type)` identity plus its fencing epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskListInfo {
    /// Task list name.
    pub name: String,
    /// Decision or activity.
    pub task_type: TaskListType,
    /// Lease epoch, incremented on every lease.
    pub range_id: i64,
    /// Highest task id known to be processed.
    pub ack_level: i64,
}

/// A persisted transfer-queue row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTaskInfo {
    /// Owning workflow.
    pub workflow_id: String,
    /// Owning run.
    pub run_id: String,
    /// Shard sequence number.
    pub task_id: i64,
    /// Task list the work is dispatched to.
    pub task_list: String,
    /// Decision or activity dispatch.
    pub task_type: TaskListType,
    /// Event id of the scheduled event.
    pub schedule_id: i64,
}

impl TransferTaskInfo {
    /// Row for a transfer `task` of `execution`; `None` for timer tasks.
    #[must_use]
    pub fn from_task(execution: &WorkflowExecution, task: &Task) -> Option<Self> {
        let (task_id, task_list, schedule_id, task_type) = match task {
            Task::Decision {
                task_id,
                task_list,
                schedule_id,
            } => (*task_id, task_list, *schedule_id, TaskListType::Decision),
            Task::Activity {
                task_id,
                task_list,
                schedule_id,
            } => (*task_id, task_list, *schedule_id, TaskListType::Activity),
            _ => return None,
        };
        Some(Self {
            workflow_id: execution.workflow_id.clone(),
            run_id: execution.run_id.clone(),
            task_id,
            task_list: task_list.clone(),
            task_type,
            schedule_id,
        })
    }

    /// Identity of the owning execution.
    #[must_use]
    pub fn execution(&self) -> WorkflowExecution {
        WorkflowExecution::new(self.workflow_id.clone(), self.run_id.clone())
    }
}

/// A persisted timer-stream row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerTaskInfo {
    /// Owning workflow.
    pub workflow_id: String,
    /// Owning run.
    pub run_id: String,
    /// Clustering key.
    pub task_id: SequenceId,
    /// Which timer kind.
    pub kind: TaskKind,
    /// Set for activity timeouts only.
    #[serde(default)]
    pub timeout_type: Option<TimeoutType>,
    /// Event id the timer refers to.
    pub event_id: i64,
}

impl TimerTaskInfo {
    /// Row for a timer `task` of `execution`; `None` for transfer tasks.
    #[must_use]
    pub fn from_task(execution: &WorkflowExecution, task: &Task) -> Option<Self> {
        let (event_id, timeout_type) = match task {
            Task::DecisionTimeout { event_id, .. } | Task::UserTimer { event_id, .. } => {
                (*event_id, None)
            }
            Task::ActivityTimeout {
                event_id,
                timeout_type,
                ..
            } => (*event_id, Some(*timeout_type)),
            Task::Decision { .. } | Task::Activity { .. } => return None,
        };
        Some(Self {
            workflow_id: execution.workflow_id.clone(),
            run_id: execution.run_id.clone(),
            task_id: SequenceId::from_raw(task.task_id()),
            kind: task.kind(),
            timeout_type,
            event_id,
        })
    }

    /// Identity of the owning execution.
    #[must_use]
    pub fn execution(&self) -> WorkflowExecution {
        WorkflowExecution::new(self.workflow_id.clone(), self.run_id.clone())
    }
}

/// A persisted task-list row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    /// Owning workflow.
    pub workflow_id: String,
    /// Owning run.
    pub run_id: String,
    /// Position within the task list, assigned by the store.
    pub task_id: i64,
    /// Event id of the scheduled event.
    pub schedule_id: i64,
}
