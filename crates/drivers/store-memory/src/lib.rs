#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cadenza Store Memory Driver
//!
//! In-memory implementation of the [`ExecutionStore`], [`TaskStore`] and
//! [`ShardStore`] ports.
//!
//! Each shard is one partition behind a single `parking_lot::Mutex`: the
//! shard record, its execution rows, the transfer queue and the timer
//! stream. Every multi-row write commits inside one critical section, which
//! gives the same all-or-nothing behaviour as a conditional batch. Task
//! lists live in a `DashMap`, one entry per `(name, task_type)`.
//!
//! Suitable for tests and single-process deployments where durability is
//! not required.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cadenza_core::ShardInfo;
//! use cadenza_ports::{ExecutionStore, ShardStore};
//! use cadenza_store_memory::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = MemoryStore::new();
//! store.create_shard(ShardInfo::new(1)).await?;
//! let executions = store.execution_store(1);
//! assert_eq!(executions.shard_id(), 1);
//! # Ok(())
//! # }
//! ```

mod execution;
mod task_list;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use cadenza_core::{
    ActivityInfo, SequenceId, ShardInfo, TimerInfo, TimerTaskInfo, TransferTaskInfo,
    WorkflowExecution, WorkflowExecutionInfo,
};
use cadenza_ports::{PortsError, ShardStore};
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, warn};

pub use execution::MemoryExecutionStore;

/// One execution row with its mutable-state maps.
#[derive(Debug, Clone)]
struct ExecutionRecord {
    info: WorkflowExecutionInfo,
    activities: HashMap<i64, ActivityInfo>,
    timers: HashMap<String, TimerInfo>,
}

/// Everything stored for one shard.
#[derive(Debug, Default)]
struct Partition {
    shard: Option<ShardInfo>,
    executions: HashMap<WorkflowExecution, ExecutionRecord>,
    transfer_tasks: BTreeMap<i64, TransferTaskInfo>,
    timer_tasks: BTreeMap<SequenceId, TimerTaskInfo>,
}

impl Partition {
    /// Reject a write presenting a stale fencing token.
    fn check_range(&self, shard_id: i32, range_id: i64) -> Result<(), PortsError> {
        let shard = self
            .shard
            .as_ref()
            .ok_or_else(|| PortsError::not_found("Shard", shard_id.to_string()))?;
        if shard.range_id != range_id {
            warn!(
                shard_id,
                range_id,
                current_range_id = shard.range_id,
                "Rejected write with stale range id"
            );
            return Err(PortsError::shard_ownership_lost(
                shard_id,
                range_id,
                shard.range_id,
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Inner {
    partitions: Mutex<HashMap<i32, Partition>>,
    task_lists: DashMap<task_list::TaskListKey, task_list::TaskListState>,
}

/// In-memory store for every shard and task list of a deployment.
///
/// Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle writing executions of `shard_id`.
    #[must_use]
    pub fn execution_store(&self, shard_id: i32) -> MemoryExecutionStore {
        MemoryExecutionStore::new(shard_id, Arc::clone(&self.inner))
    }
}

#[async_trait]
impl ShardStore for MemoryStore {
    async fn create_shard(&self, info: ShardInfo) -> Result<(), PortsError> {
        let mut partitions = self.inner.partitions.lock();
        let partition = partitions.entry(info.shard_id).or_default();
        if let Some(existing) = &partition.shard {
            return Err(PortsError::condition_failed(
                "Shard",
                info.shard_id.to_string(),
                info.range_id,
                existing.range_id,
            ));
        }
        debug!(shard_id = info.shard_id, range_id = info.range_id, "Created shard");
        partition.shard = Some(info);
        Ok(())
    }

    async fn get_shard(&self, shard_id: i32) -> Result<ShardInfo, PortsError> {
        self.inner
            .partitions
            .lock()
            .get(&shard_id)
            .and_then(|p| p.shard.clone())
            .ok_or_else(|| PortsError::not_found("Shard", shard_id.to_string()))
    }

    async fn update_shard(&self, info: ShardInfo, previous_range_id: i64) -> Result<(), PortsError> {
        let mut partitions = self.inner.partitions.lock();
        let shard = partitions
            .get_mut(&info.shard_id)
            .and_then(|p| p.shard.as_mut())
            .ok_or_else(|| PortsError::not_found("Shard", info.shard_id.to_string()))?;
        if shard.range_id != previous_range_id {
            warn!(
                shard_id = info.shard_id,
                previous_range_id,
                current_range_id = shard.range_id,
                "Rejected shard update"
            );
            return Err(PortsError::shard_ownership_lost(
                info.shard_id,
                previous_range_id,
                shard.range_id,
            ));
        }
        debug!(
            shard_id = info.shard_id,
            range_id = info.range_id,
            owner = %info.owner,
            "Updated shard"
        );
        *shard = info;
        Ok(())
    }
}
