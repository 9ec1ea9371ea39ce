//! Execution store port.
//!
//! Persistence interface for workflow execution rows, their mutable state,
//! and the per-shard transfer queue and timer stream. One store handle serves
//! one shard; every write is a single conditional batch.

use async_trait::async_trait;
use cadenza_core::{
    SequenceId, TimerTaskInfo, TransferTaskInfo, WorkflowExecution, WorkflowExecutionInfo,
    WorkflowMutableState,
};

use crate::error::PortsError;
use crate::request::{
    CreateWorkflowExecutionRequest, CreateWorkflowExecutionResponse,
    UpdateWorkflowExecutionRequest,
};

/// Conditional-write store for one shard's workflow executions.
///
/// Covers three concerns:
/// - **Rows**: execution create / compare-and-swap update / delete
/// - **Mutable state**: pending activity and timer maps, written with the row
/// - **Queues**: the transfer queue and the timer stream, appended with the row
///
/// Fencing is checked before the optimistic-concurrency condition, so a
/// stale owner always sees [`PortsError::ShardOwnershipLost`].
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Shard this handle writes to.
    fn shard_id(&self) -> i32;

    /// Insert a new execution and its initial tasks.
    ///
    /// Fails with [`PortsError::AlreadyStarted`] if the run exists or another
    /// run of the same workflow is still open.
    async fn create_workflow_execution(
        &self,
        request: CreateWorkflowExecutionRequest,
    ) -> Result<CreateWorkflowExecutionResponse, PortsError>;

    /// Replace an execution row if its stored `next_event_id` equals the
    /// request's condition, applying all task and state deltas atomically.
    ///
    /// A task key that is already stored (other than the timer task the
    /// request deletes) fails the whole write; keys are never overwritten.
    async fn update_workflow_execution(
        &self,
        request: UpdateWorkflowExecutionRequest,
    ) -> Result<(), PortsError>;

    /// Remove an execution together with its queued transfer and timer
    /// tasks. Removing an absent execution succeeds.
    async fn delete_workflow_execution(
        &self,
        info: &WorkflowExecutionInfo,
    ) -> Result<(), PortsError>;

    /// Read an execution row.
    async fn get_workflow_execution_info(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowExecutionInfo, PortsError>;

    /// Read pending activities and timers of an execution.
    async fn get_workflow_mutable_state(
        &self,
        execution: &WorkflowExecution,
    ) -> Result<WorkflowMutableState, PortsError>;

    /// Up to `batch_size` transfer tasks with ids above `read_level`, ascending.
    async fn get_transfer_tasks(
        &self,
        read_level: i64,
        batch_size: usize,
    ) -> Result<Vec<TransferTaskInfo>, PortsError>;

    /// Remove a transfer task. Completing it twice fails with
    /// [`PortsError::NotFound`] so duplicate dispatch is observable.
    async fn complete_transfer_task(
        &self,
        execution: &WorkflowExecution,
        task_id: i64,
    ) -> Result<(), PortsError>;

    /// Timer tasks with `min_exclusive < key <= max_inclusive`, ascending.
    async fn get_timer_index_tasks(
        &self,
        min_exclusive: SequenceId,
        max_inclusive: SequenceId,
    ) -> Result<Vec<TimerTaskInfo>, PortsError>;
}
