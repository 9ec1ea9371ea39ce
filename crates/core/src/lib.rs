#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cadenza Core
//!
//! Data model shared by every Cadenza crate.
//!
//! ## Key Components
//!
//! - **Identity**: [`WorkflowExecution`], the `(workflow_id, run_id)` pair
//! - **Execution row**: [`WorkflowExecutionInfo`] and its [`WorkflowState`]
//! - **Mutable state**: [`ActivityInfo`], [`TimerInfo`], [`WorkflowMutableState`]
//! - **Tasks**: the closed [`Task`] sum type plus the persisted rows
//!   ([`TransferTaskInfo`], [`TimerTaskInfo`], [`TaskInfo`]) and [`TaskListInfo`]
//! - **Shards**: [`ShardInfo`], which carries the shard fencing token
//! - **Timer keys**: [`SequenceId`], the `(expiry, tie-break)` codec
//!
//! ## Usage
//!
//! ```rust
//! use cadenza_core::{SequenceId, WorkflowExecution};
//!
//! let execution = WorkflowExecution::new_run("order-42");
//! let key = SequenceId::construct(1_700_000_000_000_000_000, 7);
//! assert_eq!(key.deconstruct().1, 7);
//! ```

pub mod constants;
pub mod execution;
pub mod sequence;
pub mod shard;
pub mod state;
pub mod task;

pub use constants::*;
pub use execution::{WorkflowExecution, WorkflowExecutionInfo, WorkflowState};
pub use sequence::SequenceId;
pub use shard::ShardInfo;
pub use state::{ActivityInfo, TimerInfo, WorkflowMutableState};
pub use task::{
    Task, TaskInfo, TaskKind, TaskListInfo, TaskListType, TimeoutType, TimerTaskInfo,
    TransferTaskInfo,
};
