//! Shard ownership record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted ownership record of one shard.
///
/// `range_id` is the fencing token: every execution write to the shard must
/// present it, and acquiring the shard bumps it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Shard number.
    pub shard_id: i32,
    /// Identity of the current owner (host name, process id, ...).
    pub owner: String,
    /// Current ownership epoch.
    pub range_id: i64,
    /// Highest transfer task id fully processed.
    pub transfer_ack_level: i64,
    /// Highest timer key fully processed.
    pub timer_ack_level: i64,
    /// Last time the record was written.
    pub updated_at: DateTime<Utc>,
}

impl ShardInfo {
    /// An unowned shard at epoch zero.
    #[must_use]
    pub fn new(shard_id: i32) -> Self {
        Self {
            shard_id,
            owner: String::new(),
            range_id: 0,
            transfer_ack_level: 0,
            timer_ack_level: 0,
            updated_at: Utc::now(),
        }
    }
}
