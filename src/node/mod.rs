//! Nodes and the edges between them.
//!
//! A [`Node`] is the atomic schedulable unit of an execution graph. It owns an
//! [`Operation`] that records the actual GPU work, and lists of edges:
//!
//! - [`Dependency`]: an edge to another node of the *same* graph, backed by a
//!   semaphore minted for that edge alone.
//! - [`DependencyInjection`]: an edge to a node of a *different* graph,
//!   referenced only by [`NodeRef`] and an externally owned semaphore.
//!
//! Nodes are created by the graph builders in [`crate::draft`] and owned by a
//! [`Graph`](crate::graph::Graph).

mod operation;

pub use operation::{ComputeOperation, GenericOperation, Operation};

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::device::Device;
use crate::executor::CommandRecorder;
use crate::sync::{PipelineStage, SemaphoreRef};

/// Identity of a node within one graph.
///
/// Negative values are reserved for synthetic/sentinel nodes chosen by the
/// caller (e.g. a final composite stage).
pub type NodeId = i64;

/// Process-unique identity of a [`Graph`](crate::graph::Graph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GraphId(u64);

impl GraphId {
    /// Mint a fresh graph identity.
    pub(crate) fn mint() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value, for logging.
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Reference to a node living in a specific graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef {
    pub graph: GraphId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(graph: GraphId, node: NodeId) -> Self {
        Self { graph, node }
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.graph, self.node)
    }
}

/// Execution progress of a node within one submission cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExecutionState {
    /// Not yet picked up in this cycle.
    Pending = 0,
    /// Being recorded and submitted.
    Executing = 1,
    /// Submitted; its signal semaphores will fire when the GPU retires it.
    Ready = 2,
}

impl ExecutionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Pending,
            1 => Self::Executing,
            _ => Self::Ready,
        }
    }
}

/// Traversal coloring used by cycle detection and topological sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitState {
    #[default]
    Pending,
    Visiting,
    Visited,
}

/// Ordering edge between two nodes of the same graph.
///
/// `to` may not start before `from` has completed. Both endpoints hold a copy
/// of the edge and therefore share the same semaphore.
#[derive(Debug, Clone)]
pub struct Dependency {
    from: NodeId,
    to: NodeId,
    semaphore: SemaphoreRef,
    stage: PipelineStage,
}

impl Dependency {
    /// Create a new edge.
    ///
    /// # Panics
    ///
    /// Panics if `from == to`.
    pub fn new(from: NodeId, to: NodeId, semaphore: SemaphoreRef, stage: PipelineStage) -> Self {
        assert!(from != to, "Node cannot depend on itself");
        Self {
            from,
            to,
            semaphore,
            stage,
        }
    }

    pub fn from(&self) -> NodeId {
        self.from
    }

    pub fn to(&self) -> NodeId {
        self.to
    }

    pub fn semaphore(&self) -> &SemaphoreRef {
        &self.semaphore
    }

    /// Stage at which `to` waits for `from`.
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }
}

/// Ordering edge to a node of another graph.
#[derive(Debug, Clone)]
pub struct DependencyInjection {
    peer: NodeRef,
    semaphore: SemaphoreRef,
    stage: PipelineStage,
}

impl DependencyInjection {
    /// Create an injection referencing `peer` through an externally owned semaphore.
    pub fn new(peer: NodeRef, semaphore: SemaphoreRef, stage: PipelineStage) -> Self {
        Self {
            peer,
            semaphore,
            stage,
        }
    }

    /// The foreign node on the other side of the boundary.
    pub fn peer(&self) -> NodeRef {
        self.peer
    }

    pub fn semaphore(&self) -> &SemaphoreRef {
        &self.semaphore
    }

    pub fn stage(&self) -> PipelineStage {
        self.stage
    }
}

/// Schedulable unit of GPU work.
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    label: String,
    state: AtomicU8,
    inputs: Vec<Dependency>,
    outputs: Vec<Dependency>,
    input_injections: Vec<DependencyInjection>,
    output_injections: Vec<DependencyInjection>,
    operation: Box<dyn Operation>,
}

impl Node {
    /// Create a node with no edges.
    pub fn new(id: NodeId, label: impl Into<String>, operation: Box<dyn Operation>) -> Self {
        Self {
            id,
            label: label.into(),
            state: AtomicU8::new(ExecutionState::Pending as u8),
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_injections: Vec::new(),
            output_injections: Vec::new(),
            operation,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Debug label of this node.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn execution_state(&self) -> ExecutionState {
        ExecutionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_execution_state(&self, state: ExecutionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Put the node back to [`ExecutionState::Pending`] for the next cycle.
    pub fn reset_execution_state(&self) {
        self.set_execution_state(ExecutionState::Pending);
    }

    /// Edges that must complete before this node may run.
    pub fn inputs(&self) -> &[Dependency] {
        &self.inputs
    }

    /// Edges this node unblocks.
    pub fn outputs(&self) -> &[Dependency] {
        &self.outputs
    }

    pub fn input_injections(&self) -> &[DependencyInjection] {
        &self.input_injections
    }

    pub fn output_injections(&self) -> &[DependencyInjection] {
        &self.output_injections
    }

    /// Whether this node already waits on `from` through a structural edge.
    pub fn depends_on(&self, from: NodeId) -> bool {
        self.inputs.iter().any(|dep| dep.from == from)
    }

    pub fn operation(&self) -> &dyn Operation {
        self.operation.as_ref()
    }

    pub fn operation_mut(&mut self) -> &mut dyn Operation {
        self.operation.as_mut()
    }

    /// Downcast the operation to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.operation.as_any().downcast_ref::<T>()
    }

    /// Downcast the operation to a concrete type, mutably.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.operation.as_any_mut().downcast_mut::<T>()
    }

    /// Record this node's work into `recorder`.
    pub fn execute(&self, recorder: &mut dyn CommandRecorder) -> bool {
        self.operation.execute(recorder)
    }

    /// Refresh the node's resource bindings.
    pub fn update(&mut self) -> bool {
        self.operation.update()
    }

    pub(crate) fn push_input(&mut self, dependency: Dependency) {
        debug_assert_eq!(dependency.to, self.id);
        self.inputs.push(dependency);
    }

    pub(crate) fn push_output(&mut self, dependency: Dependency) {
        debug_assert_eq!(dependency.from, self.id);
        self.outputs.push(dependency);
    }

    pub(crate) fn push_input_injection(&mut self, injection: DependencyInjection) {
        self.input_injections.push(injection);
    }

    pub(crate) fn push_output_injection(&mut self, injection: DependencyInjection) {
        self.output_injections.push(injection);
    }

    /// Drop every input injection whose peer satisfies `predicate`.
    pub(crate) fn remove_input_injections(&mut self, predicate: impl Fn(NodeRef) -> bool) {
        self.input_injections.retain(|inj| !predicate(inj.peer));
    }

    /// Drop every output injection whose peer satisfies `predicate`.
    pub(crate) fn remove_output_injections(&mut self, predicate: impl Fn(NodeRef) -> bool) {
        self.output_injections.retain(|inj| !predicate(inj.peer));
    }

    /// Deep-copy the node without any edges.
    ///
    /// The owning graph re-links the copy with freshly minted semaphores.
    pub(crate) fn clone_unlinked(&self, device: &dyn Device) -> Self {
        Self::new(
            self.id,
            self.label.clone(),
            self.operation.clone_operation(device),
        )
    }
}

static_assertions::assert_impl_all!(Node: Send, Sync);
