//! Error types for port operations.
//!
//! Every port method returns `Result<_, PortsError>`. Callers branch on the
//! variant, never on the message. Nothing in the core retries: a
//! [`ConditionFailed`](PortsError::ConditionFailed) or
//! [`ShardOwnershipLost`](PortsError::ShardOwnershipLost) goes straight back
//! to whoever issued the write, since only they know whether the competing
//! writer is legitimate.

/// Error type for all port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortsError {
    /// A create collided with an existing execution of the same workflow.
    #[error("workflow execution already started: {workflow_id}/{run_id}")]
    AlreadyStarted {
        /// Workflow id of the conflicting execution.
        workflow_id: String,
        /// Run id of the execution that already exists.
        run_id: String,
    },

    /// Optimistic-concurrency token mismatch.
    #[error("{entity} {id}: condition failed, expected {expected}, got {actual}")]
    ConditionFailed {
        /// Kind of entity (e.g. "WorkflowExecution", "TaskList").
        entity: String,
        /// Identifier of the entity.
        id: String,
        /// Token the caller presented.
        expected: i64,
        /// Token currently stored.
        actual: i64,
    },

    /// The presented shard fencing token is stale.
    #[error("shard {shard_id} ownership lost: presented range {range_id}, current {current_range_id}")]
    ShardOwnershipLost {
        /// Shard being written.
        shard_id: i32,
        /// RangeID the caller presented.
        range_id: i64,
        /// RangeID currently stored.
        current_range_id: i64,
    },

    /// Entity not found (including a task that was already completed).
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity (e.g. "WorkflowExecution", "TransferTask").
        entity: String,
        /// Identifier that was looked up.
        id: String,
    },

    /// Malformed input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A user timer with this id is already pending.
    #[error("timer already pending: {timer_id}")]
    DuplicateTimer {
        /// Colliding timer id.
        timer_id: String,
    },

    /// The shard's current sequence block is used up; renew the range.
    #[error("shard {shard_id} sequence block for range {range_id} exhausted")]
    SequenceExhausted {
        /// Shard whose block ran out.
        shard_id: i32,
        /// Range the block belonged to.
        range_id: i64,
    },

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PortsError {
    /// Convenience constructor for [`PortsError::AlreadyStarted`].
    pub fn already_started(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self::AlreadyStarted {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }

    /// Convenience constructor for [`PortsError::ConditionFailed`].
    pub fn condition_failed(
        entity: impl Into<String>,
        id: impl Into<String>,
        expected: i64,
        actual: i64,
    ) -> Self {
        Self::ConditionFailed {
            entity: entity.into(),
            id: id.into(),
            expected,
            actual,
        }
    }

    /// Convenience constructor for [`PortsError::ShardOwnershipLost`].
    pub fn shard_ownership_lost(shard_id: i32, range_id: i64, current_range_id: i64) -> Self {
        Self::ShardOwnershipLost {
            shard_id,
            range_id,
            current_range_id,
        }
    }

    /// Convenience constructor for [`PortsError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Convenience constructor for [`PortsError::InvalidArgument`].
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Convenience constructor for [`PortsError::DuplicateTimer`].
    pub fn duplicate_timer(timer_id: impl Into<String>) -> Self {
        Self::DuplicateTimer {
            timer_id: timer_id.into(),
        }
    }

    /// Returns `true` for the expected, frequent outcomes of contention.
    ///
    /// [`ConditionFailed`](Self::ConditionFailed): re-read and retry.
    /// [`ShardOwnershipLost`](Self::ShardOwnershipLost): re-acquire the shard first.
    /// [`SequenceExhausted`](Self::SequenceExhausted): renew the range first.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConditionFailed { .. }
                | Self::ShardOwnershipLost { .. }
                | Self::SequenceExhausted { .. }
        )
    }

    /// Returns `true` if this is a [`NotFound`](Self::NotFound).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<serde_json::Error> for PortsError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
