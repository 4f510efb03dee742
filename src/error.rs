//! Error types for graph construction, ensemble restructuring and execution.

use std::time::Duration;

use thiserror::Error;

use crate::node::NodeId;

/// Errors raised while building or validating an execution graph.
///
/// Any of these aborts the whole construction call: a malformed graph is never
/// handed back to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// A requested probe (output) node was never submitted to the draft.
    #[error("path {0} doesn't exist")]
    PathDoesntExist(String),
    /// The same probe appears more than once in one request.
    #[error("path {0} is referenced more than once")]
    PathReferencedMoreThanOnce(String),
    /// A connection references an endpoint that was never submitted.
    #[error("invalid connection {from} -> {to}")]
    InvalidConnection { from: String, to: String },
    /// A connection goes from a node to itself.
    #[error("node {0} depends upon itself")]
    DependencyUponItself(String),
    /// The graph contains a cycle.
    #[error("found embedded circuit through node {0}")]
    FoundEmbeddedCircuit(NodeId),
    /// A boundary injection targets a node that is not part of the graph.
    #[error("injected operation {0} doesn't exist")]
    InjectedOpDoesntExist(NodeId),
    /// A constructor or connector callback refused a node.
    #[error("construction failed: {0}")]
    Construction(String),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Errors raised when restructuring an [`Ensemble`](crate::ensemble::Ensemble).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnsembleError {
    /// Heapify was requested on an ensemble that is not a flat graph sequence.
    #[error("ensemble is not flat")]
    NotFlat,
    /// A cut index is out of range or not strictly increasing.
    #[error("invalid cut at index {index} for a sequence of {len} graphs")]
    InvalidCut { index: usize, len: usize },
    /// Stitching a boundary failed.
    #[error(transparent)]
    Graph(#[from] GraphError),
}

pub type EnsembleResult<T> = Result<T, EnsembleError>;

/// Runtime failures reported by the [`Executor`](crate::executor::Executor).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    /// The executor was created without any execution units.
    #[error("no execution units available")]
    NoExecUnits,
    /// An execution unit did not retire its previous work in time.
    #[error("execution unit {unit} timed out after {timeout:?}")]
    Timeout { unit: usize, timeout: Duration },
    /// A node refused to record its work.
    #[error("node {0} failed to record its commands")]
    RecordingFailed(NodeId),
    /// The submission queue rejected a command buffer.
    #[error("submission failed: {0}")]
    Submit(String),
}

pub type ExecResult<T> = Result<T, ExecError>;
