//! [`ExecutionStore`] over one shard partition.

use std::collections::{HashMap, HashSet};
use std::ops::Bound;
use std::sync::Arc;

use async_trait::async_trait;
use cadenza_core::{
    SequenceId, Task, TimerTaskInfo, TransferTaskInfo, WorkflowExecution, WorkflowExecutionInfo,
    WorkflowMutableState, WorkflowState,
};
use cadenza_ports::{
    CreateWorkflowExecutionRequest, CreateWorkflowExecutionResponse, ExecutionStore, PortsError,
    UpdateWorkflowExecutionRequest,
};
use chrono::Utc;
use tracing::debug;

use crate::{ExecutionRecord, Inner, Partition};

/// Execution store handle bound to one shard of a [`MemoryStore`].
///
/// [`MemoryStore`]: crate::MemoryStore
#[derive(Debug, Clone)]
pub struct MemoryExecutionStore {
    shard_id: i32,
    inner: Arc<Inner>,
}

impl MemoryExecutionStore {
    pub(crate) fn new(shard_id: i32, inner: Arc<Inner>) -> Self {
        Self { shard_id, inner }
    }

    /// Run a read against the partition, or `None` if the shard is unknown.
    fn read_partition<T>(&self, f: impl FnOnce(&Partition) -> T) -> Option<T> {
        self.inner.partitions.lock().get(&self.shard_id).map(f)
    }

    /// Run a write against the partition of a known shard.
    fn write_partition<T>(
        &self,
        f: impl FnOnce(&mut Partition) -> Result<T, PortsError>,
    ) -> Result<T, PortsError> {
        let mut partitions = self.inner.partitions.lock();
        let partition = partitions
            .get_mut(&self.shard_id)
            .ok_or_else(|| PortsError::not_found("Shard", self.shard_id.to_string()))?;
        f(partition)
    }
}

fn execution_not_found(execution: &WorkflowExecution) -> PortsError {
    PortsError::not_found("WorkflowExecution", execution.to_string())
}

fn key_taken(queue: &str, task_id: i64) -> PortsError {
    PortsError::Internal(format!("{queue} task key {task_id} is already taken"))
}

/// Reject task keys that are stored already or repeated within the write.
///
/// `freed_timer_task` is deleted by the same write, so its key may be reused.
fn check_task_keys(
    partition: &Partition,
    transfer_tasks: &[Task],
    timer_tasks: &[Task],
    freed_timer_task: Option<i64>,
) -> Result<(), PortsError> {
    let mut seen = HashSet::new();
    for task in transfer_tasks {
        let task_id = task.task_id();
        if partition.transfer_tasks.contains_key(&task_id) || !seen.insert(task_id) {
            return Err(key_taken("transfer", task_id));
        }
    }
    seen.clear();
    for task in timer_tasks {
        let task_id = task.task_id();
        let stored = partition
            .timer_tasks
            .contains_key(&SequenceId::from_raw(task_id))
            && freed_timer_task != Some(task_id);
        if stored || !seen.insert(task_id) {
            return Err(key_taken("timer", task_id));
        }
    }
    Ok(())
}

fn append_tasks(
    partition: &mut Partition,
    execution: &WorkflowExecution,
    transfer_tasks: &[Task],
    timer_tasks: &[Task],
) {
    for row in transfer_tasks
        .iter()
        .filter_map(|t| TransferTaskInfo::from_task(execution, t))
    {
        partition.transfer_tasks.insert(row.task_id, row);
    }
    for row in timer_tasks
        .iter()
        .filter_map(|t| TimerTaskInfo::from_task(execution, t))
    {
        partition.timer_tasks.insert(row.task_id, row);
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    fn shard_id(&self) -> i32 {
        self.shard_id
    }

    async fn create_workflow_execution(
        &self,
        request: CreateWorkflowExecutionRequest,
    ) -> Result<CreateWorkflowExecutionResponse, PortsError> {
        request.validate()?;
        let shard_id = self.shard_id;

        self.write_partition(|partition| {
            partition.check_range(shard_id, request.range_id)?;

            let execution = &request.execution;
            let conflict = partition.executions.values().find(|record| {
                record.info.workflow_id == execution.workflow_id
                    && (record.info.run_id == execution.run_id || record.info.state.is_open())
            });
            if let Some(existing) = conflict {
                return Err(PortsError::already_started(
                    existing.info.workflow_id.clone(),
                    existing.info.run_id.clone(),
                ));
            }

            let info = WorkflowExecutionInfo {
                workflow_id: execution.workflow_id.clone(),
                run_id: execution.run_id.clone(),
                task_list: request.task_list.clone(),
                history: request.history.clone(),
                execution_context: request.execution_context.clone(),
                state: WorkflowState::Created,
                next_event_id: request.next_event_id,
                last_processed_event: request.last_processed_event,
                decision_pending: true,
                last_updated_timestamp: Utc::now(),
            };
            check_task_keys(partition, &request.transfer_tasks, &request.timer_tasks, None)?;
            append_tasks(
                partition,
                execution,
                &request.transfer_tasks,
                &request.timer_tasks,
            );
            partition.executions.insert(
                execution.clone(),
                ExecutionRecord {
                    info,
                    activities: HashMap::new(),
                    timers: HashMap::new(),
                },
            );

            debug!(
                shard_id,
                %execution,
                transfer_tasks = request.transfer_tasks.len(),
                timer_tasks = request.timer_tasks.len(),
                "Created workflow execution"
            );
            Ok(CreateWorkflowExecutionResponse {
                task_id: request.transfer_tasks.first().map(Task::task_id),
            })
        })
    }

    async fn update_workflow_execution(
        &self,
        request: UpdateWorkflowExecutionRequest,
    ) -> Result<(), PortsError> {
        request.validate()?;
        let shard_id = self.shard_id;
        let execution = request.execution();

        self.write_partition(|partition| {
            if let Some(range_id) = request.range_id {
                partition.check_range(shard_id, range_id)?;
            }

            let current = partition
                .executions
                .get(&execution)
                .ok_or_else(|| execution_not_found(&execution))?
                .info
                .next_event_id;
            if current != request.condition {
                return Err(PortsError::condition_failed(
                    "WorkflowExecution",
                    execution.to_string(),
                    request.condition,
                    current,
                ));
            }
            check_task_keys(
                partition,
                &request.transfer_tasks,
                &request.timer_tasks,
                request.delete_timer_task,
            )?;

            if let Some(record) = partition.executions.get_mut(&execution) {
                record.info = WorkflowExecutionInfo {
                    last_updated_timestamp: Utc::now(),
                    ..request.execution_info.clone()
                };
                for info in &request.upsert_activity_infos {
                    record.activities.insert(info.schedule_id, info.clone());
                }
                if let Some(schedule_id) = request.delete_activity_info {
                    record.activities.remove(&schedule_id);
                }
                for info in &request.upsert_timer_infos {
                    record.timers.insert(info.timer_id.clone(), info.clone());
                }
                for timer_id in &request.delete_timer_infos {
                    record.timers.remove(timer_id);
                }
            }

            if let Some(task_id) = request.delete_timer_task {
                partition.timer_tasks.remove(&SequenceId::from_raw(task_id));
            }
            append_tasks(
                partition,
                &execution,
                &request.transfer_tasks,
                &request.timer_tasks,
            );

            debug!(
                shard_id,
                %execution,
                condition = request.condition,
                next_event_id = request.execution_info.next_event_id,
                "Updated workflow execution"
            );
            Ok(())
        })
    }

    async fn delete_workflow_execution(
        &self,
        info: &WorkflowExecutionInfo,
    ) -> Result<(), PortsError> {
        let execution = info.execution();
        let owned = |workflow_id: &str, run_id: &str| {
            workflow_id == execution.workflow_id && run_id == execution.run_id
        };

        let mut partitions = self.inner.partitions.lock();
        let Some(partition) = partitions.get_mut(&self.shard_id) else {
            return Ok(());
        };
        let removed = partition.executions.remove(&execution).is_some();
        partition
            .transfer_tasks
            .retain(|_, row| !owned(row.workflow_id.as_str(), row.run_id.as_str()));
        partition
            .timer_tasks
            .retain(|_, row| !owned(row.workflow_id.as_str(), row.run_id.as_str()));
        debug!(shard_id = self.shard_id, %execution, removed, "Deleted workflow execution");
        Ok(())
    }

    async fn get_workflow_execution_info(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowExecutionInfo, PortsError> {
        self.read_partition(|p| p.executions.get(execution).map(|record| record.info.clone()))
            .flatten()
            .ok_or_else(|| execution_not_found(execution))
    }

    async fn get_workflow_mutable_state(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowMutableState, PortsError> {
        self.read_partition(|p| {
            p.executions.get(execution).map(|record| WorkflowMutableState {
                activity_infos: record.activities.clone(),
                timer_infos: record.timers.clone(),
            })
        })
        .flatten()
        .ok_or_else(|| execution_not_found(execution))
    }

    async fn get_transfer_tasks(
        &self,
        read_level: i64,
        batch_size: usize,
    ) -> Result<Vec<TransferTaskInfo>, PortsError> {
        Ok(self
            .read_partition(|p| {
                p.transfer_tasks
                    .range((Bound::Excluded(read_level), Bound::Unbounded))
                    .take(batch_size)
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn complete_transfer_task(
        &self,
        execution: &WorkflowExecution,
        task_id: i64,
    ) -> Result<(), PortsError> {
        self.write_partition(|p| {
            let owned = p
                .transfer_tasks
                .get(&task_id)
                .is_some_and(|row| {
                    row.workflow_id == execution.workflow_id && row.run_id == execution.run_id
                });
            if !owned {
                return Err(PortsError::not_found(
                    "TransferTask",
                    format!("{execution}#{task_id}"),
                ));
            }
            p.transfer_tasks.remove(&task_id);
            Ok(())
        })
    }

    async fn get_timer_index_tasks(
        &self,
        min_exclusive: SequenceId,
        max_inclusive: SequenceId,
    ) -> Result<Vec<TimerTaskInfo>, PortsError> {
        if min_exclusive >= max_inclusive {
            return Ok(Vec::new());
        }
        Ok(self
            .read_partition(|p| {
                p.timer_tasks
                    .range((Bound::Excluded(min_exclusive), Bound::Included(max_inclusive)))
                    .map(|(_, row)| row.clone())
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use cadenza_core::ShardInfo;
    use cadenza_ports::ShardStore;
    use pretty_assertions::assert_eq;

    async fn shard() -> MemoryExecutionStore {
        let store = MemoryStore::new();
        store
            .create_shard(ShardInfo {
                range_id: 1,
                ..ShardInfo::new(1)
            })
            .await
            .unwrap();
        store.execution_store(1)
    }

    fn create(
        execution: &WorkflowExecution,
        transfer: Vec<Task>,
        timers: Vec<Task>,
    ) -> CreateWorkflowExecutionRequest {
        CreateWorkflowExecutionRequest {
            execution: execution.clone(),
            task_list: "q".into(),
            history: b"history".to_vec(),
            execution_context: None,
            next_event_id: 3,
            last_processed_event: 0,
            range_id: 1,
            transfer_tasks: transfer,
            timer_tasks: timers,
        }
    }

    #[tokio::test]
    async fn timer_scan_bounds() {
        let store = shard().await;
        let execution = WorkflowExecution::new("wf", "run");
        let keys: Vec<i64> = (1..=4)
            .map(|i| SequenceId::construct(i << 30, i).raw())
            .collect();
        let timers = keys
            .iter()
            .map(|&task_id| Task::UserTimer { task_id, event_id: 2 })
            .collect();
        store
            .create_workflow_execution(create(&execution, Vec::new(), timers))
            .await
            .unwrap();

        let all = store
            .get_timer_index_tasks(SequenceId::MIN, SequenceId::MAX)
            .await
            .unwrap();
        let got: Vec<i64> = all.iter().map(|t| t.task_id.raw()).collect();
        assert_eq!(got, keys);

        let middle = store
            .get_timer_index_tasks(SequenceId::from_raw(keys[0]), SequenceId::from_raw(keys[2]))
            .await
            .unwrap();
        let got: Vec<i64> = middle.iter().map(|t| t.task_id.raw()).collect();
        assert_eq!(got, keys[1..=2].to_vec());

        let empty = store
            .get_timer_index_tasks(SequenceId::from_raw(keys[3]), SequenceId::from_raw(keys[0]))
            .await
            .unwrap();
        assert!(empty.is_empty());
    }

    #[tokio::test]
    async fn transfer_reads_respect_level_and_batch() {
        let store = shard().await;
        let execution = WorkflowExecution::new("wf", "run");
        let transfer = (10..15)
            .map(|task_id| Task::Decision {
                task_id,
                task_list: "q".into(),
                schedule_id: 2,
            })
            .collect();
        store
            .create_workflow_execution(create(&execution, transfer, Vec::new()))
            .await
            .unwrap();

        let batch = store.get_transfer_tasks(11, 2).await.unwrap();
        let ids: Vec<i64> = batch.iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec![12, 13]);
    }

    #[tokio::test]
    async fn completing_someone_elses_task_is_not_found() {
        let store = shard().await;
        let execution = WorkflowExecution::new("wf", "run");
        store
            .create_workflow_execution(create(
                &execution,
                vec![Task::Decision {
                    task_id: 7,
                    task_list: "q".into(),
                    schedule_id: 2,
                }],
                Vec::new(),
            ))
            .await
            .unwrap();

        let other = WorkflowExecution::new("wf", "other");
        assert!(store.complete_transfer_task(&other, 7).await.unwrap_err().is_not_found());
        store.complete_transfer_task(&execution, 7).await.unwrap();
    }

    #[tokio::test]
    async fn misfiled_task_is_rejected_before_any_write() {
        let store = shard().await;
        let execution = WorkflowExecution::new("wf", "run");
        let err = store
            .create_workflow_execution(create(
                &execution,
                vec![Task::UserTimer {
                    task_id: 1,
                    event_id: 2,
                }],
                Vec::new(),
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, PortsError::InvalidArgument(_)));
        assert!(store.get_workflow_execution_info(&execution).await.unwrap_err().is_not_found());
    }
}
