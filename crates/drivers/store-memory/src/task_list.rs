//! [`TaskStore`] over a `DashMap` of task lists.

use std::collections::BTreeMap;

use async_trait::async_trait;
use cadenza_core::{TaskInfo, TaskListInfo, TaskListType, WorkflowExecution};
use cadenza_ports::{CompleteTaskRequest, GetTasksResponse, PortsError, TaskStore};
use tracing::debug;

use crate::MemoryStore;

pub(crate) type TaskListKey = (String, TaskListType);

/// One task list: its lease, ack level and pending tasks.
#[derive(Debug, Default)]
pub(crate) struct TaskListState {
    range_id: i64,
    ack_level: i64,
    last_task_id: i64,
    tasks: BTreeMap<i64, TaskInfo>,
}

impl TaskListState {
    fn push(&mut self, execution: &WorkflowExecution, schedule_id: i64) -> i64 {
        self.last_task_id += 1;
        let task_id = self.last_task_id;
        self.tasks.insert(
            task_id,
            TaskInfo {
                workflow_id: execution.workflow_id.clone(),
                run_id: execution.run_id.clone(),
                task_id,
                schedule_id,
            },
        );
        task_id
    }
}

fn key(task_list: &str, task_type: TaskListType) -> TaskListKey {
    (task_list.to_owned(), task_type)
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create_decision_task(
        &self,
        execution: &WorkflowExecution,
        task_list: &str,
        schedule_id: i64,
    ) -> Result<i64, PortsError> {
        let task_id = self
            .inner
            .task_lists
            .entry(key(task_list, TaskListType::Decision))
            .or_default()
            .push(execution, schedule_id);
        debug!(task_list, %execution, schedule_id, task_id, "Created decision task");
        Ok(task_id)
    }

    async fn create_activity_tasks(
        &self,
        execution: &WorkflowExecution,
        tasks: &BTreeMap<i64, String>,
    ) -> Result<Vec<i64>, PortsError> {
        let task_ids = tasks
            .iter()
            .map(|(&schedule_id, task_list)| {
                let task_id = self
                    .inner
                    .task_lists
                    .entry(key(task_list, TaskListType::Activity))
                    .or_default()
                    .push(execution, schedule_id);
                debug!(task_list = %task_list, %execution, schedule_id, task_id, "Created activity task");
                task_id
            })
            .collect();
        Ok(task_ids)
    }

    async fn get_tasks(
        &self,
        task_list: &str,
        task_type: TaskListType,
        batch_size: usize,
    ) -> Result<GetTasksResponse, PortsError> {
        let tasks = self
            .inner
            .task_lists
            .get(&key(task_list, task_type))
            .map(|state| state.tasks.values().take(batch_size).cloned().collect())
            .unwrap_or_default();
        Ok(GetTasksResponse { tasks })
    }

    async fn complete_task(&self, request: CompleteTaskRequest) -> Result<(), PortsError> {
        let lease = &request.task_list;
        let mut state = self
            .inner
            .task_lists
            .entry(key(&lease.name, lease.task_type))
            .or_default();
        if state.range_id != lease.range_id {
            return Err(PortsError::condition_failed(
                "TaskList",
                format!("{}/{}", lease.name, lease.task_type),
                lease.range_id,
                state.range_id,
            ));
        }
        state.tasks.remove(&request.task_id);
        state.ack_level = lease.ack_level;
        debug!(
            task_list = %lease.name,
            task_type = %lease.task_type,
            task_id = request.task_id,
            ack_level = lease.ack_level,
            "Completed task"
        );
        Ok(())
    }

    async fn lease_task_list(
        &self,
        task_list: &str,
        task_type: TaskListType,
    ) -> Result<TaskListInfo, PortsError> {
        let mut state = self
            .inner
            .task_lists
            .entry(key(task_list, task_type))
            .or_default();
        state.range_id += 1;
        debug!(task_list, %task_type, range_id = state.range_id, "Leased task list");
        Ok(TaskListInfo {
            name: task_list.to_owned(),
            task_type,
            range_id: state.range_id,
            ack_level: state.ack_level,
        })
    }
}
