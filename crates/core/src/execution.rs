//! Workflow execution identity and the persisted execution row.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of one workflow run.
///
/// Both halves are opaque to the core; they are unique together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Caller-chosen workflow identifier.
    pub workflow_id: String,
    /// Identifier of this particular run of the workflow.
    pub run_id: String,
}

impl WorkflowExecution {
    /// Create an execution identity from its two halves.
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
        }
    }

    /// Start a new run of `workflow_id` with a random UUIDv4 run id.
    pub fn new_run(workflow_id: impl Into<String>) -> Self {
        Self::new(workflow_id, uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for WorkflowExecution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workflow_id, self.run_id)
    }
}

/// Lifecycle state of a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum WorkflowState {
    /// Persisted, first decision not yet processed.
    Created,
    /// At least one decision has been processed.
    Running,
    /// Closed successfully.
    Completed,
    /// Closed by an external termination.
    Terminated,
}

impl WorkflowState {
    /// Returns `true` while the run may still make progress.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Created | Self::Running)
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Terminated => write!(f, "terminated"),
        }
    }
}

/// Control state of one workflow execution as stored by the execution store.
///
/// `next_event_id` doubles as the optimistic-concurrency token: every update
/// must present the value it read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowExecutionInfo {
    /// Workflow identifier.
    pub workflow_id: String,
    /// Run identifier.
    pub run_id: String,
    /// Task list decisions for this run are dispatched on.
    pub task_list: String,
    /// Opaque reference to the history log.
    pub history: Vec<u8>,
    /// Opaque caller-defined context.
    #[serde(default)]
    pub execution_context: Option<Vec<u8>>,
    /// Lifecycle state.
    pub state: WorkflowState,
    /// Next history event id; also the update condition.
    pub next_event_id: i64,
    /// High-water mark of processed history events.
    pub last_processed_event: i64,
    /// Whether a decision task is outstanding.
    pub decision_pending: bool,
    /// Assigned by the store on every write.
    pub last_updated_timestamp: DateTime<Utc>,
}

impl WorkflowExecutionInfo {
    /// Identity of this execution.
    #[must_use]
    pub fn execution(&self) -> WorkflowExecution {
        WorkflowExecution::new(self.workflow_id.clone(), self.run_id.clone())
    }

    /// Returns `true` if this row belongs to `execution`.
    #[must_use]
    pub fn is_execution(&self, execution: &WorkflowExecution) -> bool {
        self.workflow_id == execution.workflow_id && self.run_id == execution.run_id
    }
}
