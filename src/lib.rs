//! # RedLilium Execution Graph
//!
//! Scheduler for GPU work described as a graph of nodes.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Draft`] and [`GraphBuilder`] - Declarative node/connection descriptions,
//!   keyed by id or by name, materialized backward from a set of probes
//! - [`Graph`] - Validated DAG with semaphore-backed edges, topological sort and
//!   cross-graph dependency injection
//! - [`Ensemble`] - Composition of graphs into serialized sequences, with
//!   flatten/heapify restructuring
//! - [`Executor`] - Submission of sorted nodes across a pool of execution units
//! - [`Device`] - The collaborator that mints semaphores, fences and execution
//!   units, with a [`DummyDevice`] for testing
//!
//! ## Example
//!
//! ```ignore
//! use redlilium_exec_graph::{ComputeOperation, Draft, DummyDevice, Ensemble, Executor};
//!
//! let device = DummyDevice::new();
//! let mut draft = Draft::new();
//! draft.add_node(0, "downsample").add_node(-1, "composite");
//! draft.connect(0, -1, ());
//!
//! let graph = draft.construct_with(&[-1], &device, |id, kernel, _| {
//!     Ok(Box::new(ComputeOperation::new(*kernel, [8, 8, 1])))
//! })?;
//!
//! let frame = Ensemble::make_seq(vec![graph], &device)?;
//! let mut executor = Executor::new(Default::default(), &device);
//! executor.execute(&frame.grouped_entries())?;
//! executor.wait_for()?;
//! ```

pub mod device;
pub mod draft;
pub mod ensemble;
pub mod error;
pub mod executor;
pub mod graph;
pub mod node;
pub mod sync;

// Re-export main types for convenience
pub use device::{Device, DummyDevice};
pub use draft::{Draft, GraphBuilder};
pub use ensemble::{Ensemble, Visit};
pub use error::{EnsembleError, EnsembleResult, ExecError, ExecResult, GraphError, GraphResult};
pub use executor::{
    Command, CommandList, CommandRecorder, ExecUnit, Executor, ExecutorConfig, SubmitQueue,
    Submission,
};
pub use graph::Graph;
pub use node::{
    ComputeOperation, Dependency, DependencyInjection, ExecutionState, GenericOperation, GraphId,
    Node, NodeId, NodeRef, Operation,
};
pub use sync::{Fence, FenceStatus, PipelineStage, Semaphore, SemaphoreRef};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the execution graph subsystem.
pub fn init() {
    log::info!("RedLilium Execution Graph v{} initialized", VERSION);
}
