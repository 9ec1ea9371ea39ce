//! Request and response shapes for the store ports.

use cadenza_core::{
    ActivityInfo, Task, TaskInfo, TaskListInfo, TimerInfo, WorkflowExecution,
    WorkflowExecutionInfo,
};
use serde::{Deserialize, Serialize};

use crate::error::PortsError;

/// Insert a new execution together with its first transfer and timer tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkflowExecutionRequest {
    /// Identity of the new run.
    pub execution: WorkflowExecution,
    /// Decision task list.
    pub task_list: String,
    /// Opaque history reference.
    pub history: Vec<u8>,
    /// Opaque execution context.
    pub execution_context: Option<Vec<u8>>,
    /// Initial `next_event_id`.
    pub next_event_id: i64,
    /// Initial `last_processed_event`.
    pub last_processed_event: i64,
    /// Shard fencing token the writer believes is current.
    pub range_id: i64,
    /// Transfer tasks, normally the first decision.
    pub transfer_tasks: Vec<Task>,
    /// Timer tasks.
    pub timer_tasks: Vec<Task>,
}

impl CreateWorkflowExecutionRequest {
    /// Reject tasks filed under the wrong queue.
    pub fn validate(&self) -> Result<(), PortsError> {
        validate_queues(&self.transfer_tasks, &self.timer_tasks)
    }
}

/// Outcome of a successful create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateWorkflowExecutionResponse {
    /// Id of the first transfer task written, if any.
    pub task_id: Option<i64>,
}

/// Conditional replacement of an execution row plus its task and state deltas.
///
/// Accepted only if the stored `next_event_id` equals `condition` and, when
/// `range_id` is set, the shard's fencing token equals `range_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateWorkflowExecutionRequest {
    /// New execution row.
    pub execution_info: WorkflowExecutionInfo,
    /// Transfer tasks to append.
    pub transfer_tasks: Vec<Task>,
    /// Timer tasks to append.
    pub timer_tasks: Vec<Task>,
    /// Key of a timer task to delete.
    pub delete_timer_task: Option<i64>,
    /// Expected stored `next_event_id`.
    pub condition: i64,
    /// Shard fencing token, if the write must be fenced.
    pub range_id: Option<i64>,
    /// Activity infos to insert or replace.
    pub upsert_activity_infos: Vec<ActivityInfo>,
    /// Schedule id of an activity info to delete.
    pub delete_activity_info: Option<i64>,
    /// Timer infos to insert or replace.
    pub upsert_timer_infos: Vec<TimerInfo>,
    /// Timer ids of timer infos to delete.
    pub delete_timer_infos: Vec<String>,
}

impl UpdateWorkflowExecutionRequest {
    /// An update that only replaces the row, conditioned on `condition`.
    #[must_use]
    pub fn new(execution_info: WorkflowExecutionInfo, condition: i64) -> Self {
        Self {
            execution_info,
            transfer_tasks: Vec::new(),
            timer_tasks: Vec::new(),
            delete_timer_task: None,
            condition,
            range_id: None,
            upsert_activity_infos: Vec::new(),
            delete_activity_info: None,
            upsert_timer_infos: Vec::new(),
            delete_timer_infos: Vec::new(),
        }
    }

    /// Append transfer tasks.
    pub fn with_transfer_tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.transfer_tasks.extend(tasks);
        self
    }

    /// Append timer tasks.
    pub fn with_timer_tasks(mut self, tasks: impl IntoIterator<Item = Task>) -> Self {
        self.timer_tasks.extend(tasks);
        self
    }

    /// Delete the timer task with this key.
    pub fn deleting_timer_task(mut self, task_id: i64) -> Self {
        self.delete_timer_task = Some(task_id);
        self
    }

    /// Fence the write with `range_id`.
    pub fn fenced(mut self, range_id: i64) -> Self {
        self.range_id = Some(range_id);
        self
    }

    /// Insert or replace activity infos.
    pub fn with_activity_infos(mut self, infos: impl IntoIterator<Item = ActivityInfo>) -> Self {
        self.upsert_activity_infos.extend(infos);
        self
    }

    /// Delete the activity info scheduled at `schedule_id`.
    pub fn deleting_activity(mut self, schedule_id: i64) -> Self {
        self.delete_activity_info = Some(schedule_id);
        self
    }

    /// Insert or replace timer infos.
    pub fn with_timer_infos(mut self, infos: impl IntoIterator<Item = TimerInfo>) -> Self {
        self.upsert_timer_infos.extend(infos);
        self
    }

    /// Delete timer infos by id.
    pub fn deleting_timers(mut self, timer_ids: impl IntoIterator<Item = String>) -> Self {
        self.delete_timer_infos.extend(timer_ids);
        self
    }

    /// Identity of the execution being updated.
    #[must_use]
    pub fn execution(&self) -> WorkflowExecution {
        self.execution_info.execution()
    }

    /// Reject tasks filed under the wrong queue.
    pub fn validate(&self) -> Result<(), PortsError> {
        validate_queues(&self.transfer_tasks, &self.timer_tasks)
    }
}

/// Pending task-list tasks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetTasksResponse {
    /// Tasks in ascending task-id order.
    pub tasks: Vec<TaskInfo>,
}

/// Complete one task-list task under a lease.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteTaskRequest {
    /// Lease the caller holds; `ack_level` is persisted on success.
    pub task_list: TaskListInfo,
    /// Task to remove.
    pub task_id: i64,
}

fn validate_queues(transfer_tasks: &[Task], timer_tasks: &[Task]) -> Result<(), PortsError> {
    if let Some(task) = transfer_tasks.iter().find(|t| t.is_timer()) {
        return Err(PortsError::invalid_argument(format!(
            "{} task {} is not a transfer task",
            task.kind(),
            task.task_id()
        )));
    }
    if let Some(task) = timer_tasks.iter().find(|t| t.is_transfer()) {
        return Err(PortsError::invalid_argument(format!(
            "{} task {} is not a timer task",
            task.kind(),
            task.task_id()
        )));
    }
    Ok(())
}
