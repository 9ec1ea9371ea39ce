#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cadenza History
//!
//! The write path of the history service: everything between a decision
//! and the conditional store update that records it.
//!
//! - [`ShardContext`] -- owns a shard, fences writes with its `range_id`,
//!   and hands out task ids from the range's sequence block
//! - [`MutableState`] -- one execution's pending activities and timers plus
//!   the deltas of the current pass
//! - [`TimerBuilder`] -- turns timeouts and user timers into timer tasks
//!   keyed by [`SequenceId`](cadenza_core::SequenceId)
//! - [`PendingTimerIndex`] -- ordered candidates backing the timer builder
//! - [`SequenceNumberGenerator`] -- durable and local tie-break sources
//! - [`HistoryConfig`] -- defaults and tunables
//!
//! ## Usage
//!
//! ```rust,ignore
//! let shard = ShardContext::acquire(shards, executions, "host-a", HistoryConfig::default()).await?;
//! let mut timers = TimerBuilder::new(Arc::new(shard.sequence_generator()), shard.config().clone());
//!
//! let mut ms = MutableState::from_persisted(info, state);
//! let condition = ms.execution_info().next_event_id;
//! let task = timers.add_user_timer("reminder", 60, started_id, &mut ms)?;
//! let request = ms.into_update_request(condition, Vec::new(), task.into_iter().collect(), None)?;
//! shard.update_workflow_execution(request).await?;
//! ```

pub mod config;
pub mod index;
pub mod mutable_state;
pub mod seq;
pub mod shard;
pub mod timer;

pub use config::HistoryConfig;
pub use index::{PendingTimerIndex, TimerCandidate};
pub use mutable_state::MutableState;
pub use seq::{LocalSeqNumGenerator, SequenceNumberGenerator, ShardSeqNumGenerator};
pub use shard::ShardContext;
pub use timer::{ActivityScheduleAttributes, TimerBuilder};
