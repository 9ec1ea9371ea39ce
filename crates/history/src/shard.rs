//! Shard ownership.
//!
//! A [`ShardContext`] is the only way this process writes to a shard. It
//! holds the shard's fencing token (`range_id`), stamps it on every write,
//! and hands out task ids from the block of sequence numbers the token
//! reserves:
//!
//! ```text
//! range_id r  ->  [ r << range_size_bits, (r + 1) << range_size_bits )
//! ```
//!
//! Blocks of different ranges never overlap, so a new owner can never
//! reuse a task id or timer tie-break issued by an old one. Once any write
//! reports [`PortsError::ShardOwnershipLost`] the context is closed and
//! refuses further writes locally.

use std::sync::Arc;

use cadenza_core::{ShardInfo, Task, TransferTaskInfo, WorkflowExecution};
use cadenza_ports::{
    CreateWorkflowExecutionRequest, ExecutionStore, PortsError, ShardStore,
    UpdateWorkflowExecutionRequest,
};
use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::HistoryConfig;
use crate::seq::ShardSeqNumGenerator;

#[derive(Debug)]
struct ShardState {
    info: ShardInfo,
    next_seq: i64,
    block_end: i64,
    lost_to: Option<i64>,
}

/// Exclusive handle on one shard.
pub struct ShardContext {
    shard_id: i32,
    config: HistoryConfig,
    shard_store: Arc<dyn ShardStore>,
    execution_store: Arc<dyn ExecutionStore>,
    state: Mutex<ShardState>,
    renew_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for ShardContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardContext")
            .field("shard_id", &self.shard_id)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl ShardContext {
    /// Take ownership of the shard served by `execution_store`.
    ///
    /// Creates the shard record on first use, then bumps its `range_id`,
    /// which fences out every previous owner.
    pub async fn acquire(
        shard_store: Arc<dyn ShardStore>,
        execution_store: Arc<dyn ExecutionStore>,
        owner: impl Into<String>,
        config: HistoryConfig,
    ) -> Result<Arc<Self>, PortsError> {
        config.validate()?;
        let shard_id = execution_store.shard_id();

        let current = match shard_store.get_shard(shard_id).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                let fresh = ShardInfo::new(shard_id);
                match shard_store.create_shard(fresh.clone()).await {
                    Ok(()) => fresh,
                    // Lost a creation race; take the winner's record.
                    Err(PortsError::ConditionFailed { .. }) => shard_store.get_shard(shard_id).await?,
                    Err(e) => return Err(e),
                }
            }
            Err(e) => return Err(e),
        };

        let previous_range_id = current.range_id;
        let info = ShardInfo {
            owner: owner.into(),
            range_id: previous_range_id + 1,
            updated_at: Utc::now(),
            ..current
        };
        let (next_seq, block_end) = sequence_block(info.range_id, config.range_size_bits)?;
        shard_store.update_shard(info.clone(), previous_range_id).await?;

        info!(
            shard_id,
            range_id = info.range_id,
            owner = %info.owner,
            "Acquired shard"
        );

        Ok(Arc::new(Self {
            shard_id,
            config,
            shard_store,
            execution_store,
            state: Mutex::new(ShardState {
                info,
                next_seq,
                block_end,
                lost_to: None,
            }),
            renew_lock: tokio::sync::Mutex::new(()),
        }))
    }

    /// Shard number.
    #[must_use]
    pub fn shard_id(&self) -> i32 {
        self.shard_id
    }

    /// Fencing token this context writes with.
    #[must_use]
    pub fn range_id(&self) -> i64 {
        self.state.lock().info.range_id
    }

    /// Copy of the ownership record as last written.
    #[must_use]
    pub fn shard_info(&self) -> ShardInfo {
        self.state.lock().info.clone()
    }

    /// Returns `true` once ownership has been lost.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().lost_to.is_some()
    }

    /// Configuration the shard was acquired with.
    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    /// Store handle for reads.
    #[must_use]
    pub fn execution_store(&self) -> &Arc<dyn ExecutionStore> {
        &self.execution_store
    }

    /// Durable generator drawing from this shard.
    #[must_use]
    pub fn sequence_generator(self: &Arc<Self>) -> ShardSeqNumGenerator {
        ShardSeqNumGenerator::new(Arc::clone(self))
    }

    /// Next number of the current sequence block.
    ///
    /// Fails with [`PortsError::SequenceExhausted`] at the end of the block;
    /// call [`renew_range`](Self::renew_range) and retry.
    pub fn next_sequence_number(&self) -> Result<i64, PortsError> {
        let mut state = self.state.lock();
        if let Some(current) = state.lost_to {
            return Err(PortsError::shard_ownership_lost(
                self.shard_id,
                state.info.range_id,
                current,
            ));
        }
        if state.next_seq >= state.block_end {
            return Err(PortsError::SequenceExhausted {
                shard_id: self.shard_id,
                range_id: state.info.range_id,
            });
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        Ok(seq)
    }

    /// Move to the next range and open its sequence block.
    pub async fn renew_range(&self) -> Result<i64, PortsError> {
        let _renewing = self.renew_lock.lock().await;

        let (info, previous_range_id) = {
            let state = self.state.lock();
            self.ensure_open(&state)?;
            let info = ShardInfo {
                range_id: state.info.range_id + 1,
                updated_at: Utc::now(),
                ..state.info.clone()
            };
            (info, state.info.range_id)
        };
        let (next_seq, block_end) = sequence_block(info.range_id, self.config.range_size_bits)?;

        self.shard_store
            .update_shard(info.clone(), previous_range_id)
            .await
            .map_err(|e| self.observe(e))?;

        let range_id = info.range_id;
        let mut state = self.state.lock();
        state.info = info;
        state.next_seq = next_seq;
        state.block_end = block_end;
        debug!(shard_id = self.shard_id, range_id, "Renewed shard range");
        Ok(range_id)
    }

    /// Start a workflow run with its first decision scheduled at
    /// `decision_schedule_id`. Returns the decision transfer task id.
    pub async fn create_workflow_execution(
        &self,
        execution: WorkflowExecution,
        task_list: &str,
        history: Vec<u8>,
        execution_context: Option<Vec<u8>>,
        next_event_id: i64,
        last_processed_event: i64,
        decision_schedule_id: i64,
        timer_tasks: Vec<Task>,
    ) -> Result<i64, PortsError> {
        let transfer_tasks = self.new_decision_transfer_tasks(task_list, &[decision_schedule_id])?;
        let task_id = transfer_tasks.first().map(Task::task_id).unwrap_or_default();

        let request = CreateWorkflowExecutionRequest {
            execution,
            task_list: task_list.to_owned(),
            history,
            execution_context,
            next_event_id,
            last_processed_event,
            range_id: self.open_range_id()?,
            transfer_tasks,
            timer_tasks,
        };
        let response = self
            .execution_store
            .create_workflow_execution(request)
            .await
            .map_err(|e| self.observe(e))?;
        Ok(response.task_id.unwrap_or(task_id))
    }

    /// Apply a conditional update fenced with this context's range.
    pub async fn update_workflow_execution(
        &self,
        request: UpdateWorkflowExecutionRequest,
    ) -> Result<(), PortsError> {
        let request = request.fenced(self.open_range_id()?);
        self.execution_store
            .update_workflow_execution(request)
            .await
            .map_err(|e| self.observe(e))
    }

    /// One decision transfer task per schedule id, with fresh task ids.
    pub fn new_decision_transfer_tasks(
        &self,
        task_list: &str,
        schedule_ids: &[i64],
    ) -> Result<Vec<Task>, PortsError> {
        schedule_ids
            .iter()
            .map(|&schedule_id| {
                Ok(Task::Decision {
                    task_id: self.next_sequence_number()?,
                    task_list: task_list.to_owned(),
                    schedule_id,
                })
            })
            .collect()
    }

    /// Next batch of transfer tasks above `read_level`.
    pub async fn get_transfer_tasks(
        &self,
        read_level: i64,
    ) -> Result<Vec<TransferTaskInfo>, PortsError> {
        self.execution_store
            .get_transfer_tasks(read_level, self.config.transfer_batch_size)
            .await
    }

    fn open_range_id(&self) -> Result<i64, PortsError> {
        let state = self.state.lock();
        self.ensure_open(&state)?;
        Ok(state.info.range_id)
    }

    fn ensure_open(&self, state: &ShardState) -> Result<(), PortsError> {
        match state.lost_to {
            Some(current) => Err(PortsError::shard_ownership_lost(
                self.shard_id,
                state.info.range_id,
                current,
            )),
            None => Ok(()),
        }
    }

    fn observe(&self, err: PortsError) -> PortsError {
        if let PortsError::ShardOwnershipLost {
            current_range_id, ..
        } = &err
        {
            let mut state = self.state.lock();
            if state.lost_to.is_none() {
                warn!(
                    shard_id = self.shard_id,
                    range_id = state.info.range_id,
                    current_range_id = *current_range_id,
                    "Shard ownership lost, closing"
                );
                state.lost_to = Some(*current_range_id);
            }
        }
        err
    }
}

/// `[range_id << bits, (range_id + 1) << bits)`, or an error if it does
/// not fit in an `i64`.
fn sequence_block(range_id: i64, range_size_bits: u32) -> Result<(i64, i64), PortsError> {
    let size = 1_i64 << range_size_bits;
    range_id
        .checked_mul(size)
        .zip(range_id.checked_add(1).and_then(|next| next.checked_mul(size)))
        .ok_or_else(|| {
            PortsError::Internal(format!(
                "range {range_id} does not fit a sequence block of 2^{range_size_bits}"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_are_adjacent_and_disjoint() {
        assert_eq!(sequence_block(1, 20).unwrap(), (1 << 20, 2 << 20));
        assert_eq!(sequence_block(2, 20).unwrap().0, sequence_block(1, 20).unwrap().1);
    }

    #[test]
    fn oversized_range_is_rejected() {
        assert!(matches!(
            sequence_block(i64::MAX >> 10, 20),
            Err(PortsError::Internal(_))
        ));
    }
}
