//! Shard store port.
//!
//! Holds the [`ShardInfo`] record whose `range_id` fences every execution
//! write to the shard.

use async_trait::async_trait;
use cadenza_core::ShardInfo;

use crate::error::PortsError;

/// Persistence for shard ownership records.
#[async_trait]
pub trait ShardStore: Send + Sync {
    /// Insert a shard record. Fails with [`PortsError::ConditionFailed`] if
    /// one already exists.
    async fn create_shard(&self, info: ShardInfo) -> Result<(), PortsError>;

    /// Read a shard record.
    async fn get_shard(&self, shard_id: i32) -> Result<ShardInfo, PortsError>;

    /// Replace a shard record if its stored `range_id` still equals
    /// `previous_range_id`; otherwise [`PortsError::ShardOwnershipLost`].
    async fn update_shard(&self, info: ShardInfo, previous_range_id: i64)
    -> Result<(), PortsError>;
}
