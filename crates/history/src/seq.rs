//! Sequence number generators for timer tie-breaks.
//!
//! Two flavours exist. The durable one hands out shard-unique numbers and is
//! used for every key that gets persisted. The local one is an in-process
//! counter, good enough to order candidates inside one [`TimerBuilder`]
//! pass but never written anywhere.
//!
//! [`TimerBuilder`]: crate::timer::TimerBuilder

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use cadenza_ports::PortsError;

use crate::shard::ShardContext;

/// Source of tie-break sequence numbers.
pub trait SequenceNumberGenerator: Send + Sync {
    /// Next number. Values are strictly increasing per generator.
    fn next_seq(&self) -> Result<i64, PortsError>;
}

/// Process-local counter. The first value is 1.
#[derive(Debug, Default)]
pub struct LocalSeqNumGenerator {
    counter: AtomicI64,
}

impl LocalSeqNumGenerator {
    /// Counter starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Next number; never fails.
    pub fn advance(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl SequenceNumberGenerator for LocalSeqNumGenerator {
    fn next_seq(&self) -> Result<i64, PortsError> {
        Ok(self.advance())
    }
}

/// Durable generator backed by the owning shard's sequence block.
///
/// Fails with [`PortsError::SequenceExhausted`] once the block is used up and
/// with [`PortsError::ShardOwnershipLost`] after the shard was lost.
#[derive(Clone)]
pub struct ShardSeqNumGenerator {
    shard: Arc<ShardContext>,
}

impl ShardSeqNumGenerator {
    /// Generator drawing from `shard`.
    #[must_use]
    pub fn new(shard: Arc<ShardContext>) -> Self {
        Self { shard }
    }
}

impl std::fmt::Debug for ShardSeqNumGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardSeqNumGenerator")
            .field("shard_id", &self.shard.shard_id())
            .field("range_id", &self.shard.range_id())
            .finish()
    }
}

impl SequenceNumberGenerator for ShardSeqNumGenerator {
    fn next_seq(&self) -> Result<i64, PortsError> {
        self.shard.next_sequence_number()
    }
}
