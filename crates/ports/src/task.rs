//! Task-list store port.
//!
//! Decision and activity tasks waiting for a poller, plus the lease that
//! fences who may complete them.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cadenza_core::{TaskListInfo, TaskListType, WorkflowExecution};

use crate::error::PortsError;
use crate::request::{CompleteTaskRequest, GetTasksResponse};

/// Task lists keyed by `(name, task_type)`.
///
/// Leasing is exclusive: [`lease_task_list`](Self::lease_task_list) bumps the
/// list's `range_id`, and [`complete_task`](Self::complete_task) is only
/// accepted from the holder of the current one.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Enqueue a decision task. Returns its task id.
    async fn create_decision_task(
        &self,
        execution: &WorkflowExecution,
        task_list: &str,
        schedule_id: i64,
    ) -> Result<i64, PortsError>;

    /// Enqueue one activity task per `schedule_id -> task_list` entry.
    /// Returns the task ids in `schedule_id` order.
    async fn create_activity_tasks(
        &self,
        execution: &WorkflowExecution,
        tasks: &BTreeMap<i64, String>,
    ) -> Result<Vec<i64>, PortsError>;

    /// Up to `batch_size` pending tasks, ascending by task id.
    async fn get_tasks(
        &self,
        task_list: &str,
        task_type: TaskListType,
        batch_size: usize,
    ) -> Result<GetTasksResponse, PortsError>;

    /// Remove a task and persist the lease's ack level.
    ///
    /// Fails with [`PortsError::ConditionFailed`] if the lease is stale.
    async fn complete_task(&self, request: CompleteTaskRequest) -> Result<(), PortsError>;

    /// Take (or renew) the lease: increments `range_id` unconditionally and
    /// returns it with the persisted ack level.
    async fn lease_task_list(
        &self,
        task_list: &str,
        task_type: TaskListType,
    ) -> Result<TaskListInfo, PortsError>;
}
