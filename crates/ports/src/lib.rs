#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cadenza Ports
//!
//! Backend interface traits (ports) for the Cadenza durable-execution core.
//!
//! This crate defines the **port** traits that backend drivers implement.
//! It follows the Ports & Drivers (hexagonal) architecture pattern:
//!
//! - [`ExecutionStore`] -- execution rows, mutable state, transfer queue, timer stream
//! - [`TaskStore`] -- task lists and their leases
//! - [`ShardStore`] -- shard ownership records (the fencing tokens)
//!
//! A driver needs per-row compare-and-set writes and range scans ordered by a
//! clustering key; nothing here depends on a particular query surface.
//!
//! All traits are `async_trait` and object-safe, suitable for use as
//! `Box<dyn Trait>` or `Arc<dyn Trait>` behind dependency injection.

pub mod error;
pub mod execution;
pub mod request;
pub mod shard;
pub mod task;

pub use error::PortsError;
pub use execution::ExecutionStore;
pub use request::{
    CompleteTaskRequest, CreateWorkflowExecutionRequest, CreateWorkflowExecutionResponse,
    GetTasksResponse, UpdateWorkflowExecutionRequest,
};
pub use shard::ShardStore;
pub use task::TaskStore;

/// Result alias for port operations.
pub type Result<T> = std::result::Result<T, PortsError>;
