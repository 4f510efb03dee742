//! Declarative graph construction.
//!
//! Two front ends describe nodes and connections in arbitrary order and then
//! materialize a validated [`Graph`] from a set of probe (output) nodes:
//!
//! | Front end | Keyed by | Typical use |
//! |-----------|----------|-------------|
//! | [`Draft`] | [`NodeId`] | Typed compute networks with sentinel ids |
//! | [`GraphBuilder`] | name | String-addressed generic operations |
//!
//! Both share the same skeleton walk: starting from the probes, upstream
//! dependencies are resolved backward, the caller's constructor builds each
//! reachable node exactly once, and the caller's connector sees every edge
//! exactly once. Nodes that no probe depends on are never constructed.
//!
//! # Example
//!
//! ```ignore
//! let mut draft = Draft::new();
//! draft.add_node(0, KernelInfo::new("downsample"));
//! draft.add_node(1, KernelInfo::new("blur"));
//! draft.add_node(-1, KernelInfo::new("composite"));
//! draft.connect(0, 1, ());
//! draft.connect(1, -1, ());
//!
//! let graph = draft.construct(&[-1], &device, make_kernel, |_, _, _| Ok(true))?;
//! ```

mod builder;
mod skeleton;

pub use builder::GraphBuilder;

use std::collections::HashMap;

use crate::device::Device;
use crate::error::GraphResult;
use crate::graph::Graph;
use crate::node::{Node, NodeId, Operation};
use crate::sync::PipelineStage;

use skeleton::{Connection, Declared};

/// ID-keyed description of nodes and connections.
///
/// `I` is the per-node info handed to the constructor, `E` the per-edge data
/// handed to the connector.
#[derive(Debug, Clone)]
pub struct Draft<I, E = ()> {
    nodes: HashMap<NodeId, Declared<I>>,
    connections: Vec<Connection<NodeId, E>>,
}

impl<I, E> Default for Draft<I, E> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            connections: Vec::new(),
        }
    }
}

impl<I, E> Draft<I, E> {
    /// Create an empty draft.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` was already declared.
    pub fn add_node(&mut self, id: NodeId, info: I) -> &mut Self {
        self.add_labeled_node(id, format!("node{id}"), info)
    }

    /// Declare a node with a debug label.
    ///
    /// # Panics
    ///
    /// Panics if `id` was already declared.
    pub fn add_labeled_node(&mut self, id: NodeId, label: impl Into<String>, info: I) -> &mut Self {
        let previous = self.nodes.insert(
            id,
            Declared {
                id,
                label: label.into(),
                info,
            },
        );
        assert!(previous.is_none(), "Node {id} is already declared");
        self
    }

    /// Request that `to` runs after `from`, waiting at every stage.
    pub fn connect(&mut self, from: NodeId, to: NodeId, extra: E) -> &mut Self {
        self.connect_at(from, to, PipelineStage::ALL_COMMANDS, extra)
    }

    /// Request that `to` waits for `from` at `stage`.
    ///
    /// Connections are only checked by [`construct`](Self::construct).
    pub fn connect_at(&mut self, from: NodeId, to: NodeId, stage: PipelineStage, extra: E) -> &mut Self {
        self.connections.push(Connection {
            from,
            to,
            stage,
            extra,
        });
        self
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Incoming connections per node, as `(from, to)` pairs in submission order.
    pub fn incoming(&self, id: NodeId) -> Vec<(NodeId, NodeId)> {
        skeleton::construct_paths(&self.connections)
            .get(&id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|&i| (self.connections[i].from, self.connections[i].to))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Forget every node and connection.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.connections.clear();
    }

    /// Materialize and validate the graph feeding `probes`.
    ///
    /// # Errors
    ///
    /// - [`PathDoesntExist`](crate::GraphError::PathDoesntExist) if a probe was not declared
    /// - [`PathReferencedMoreThanOnce`](crate::GraphError::PathReferencedMoreThanOnce) for repeated probes
    /// - [`DependencyUponItself`](crate::GraphError::DependencyUponItself) for `connect(x, x, ..)`
    /// - [`InvalidConnection`](crate::GraphError::InvalidConnection) for undeclared endpoints
    /// - [`FoundEmbeddedCircuit`](crate::GraphError::FoundEmbeddedCircuit) if the result has a cycle
    /// - any error returned by `constructor` or `connector`
    pub fn construct<C, N>(
        &self,
        probes: &[NodeId],
        device: &dyn Device,
        constructor: C,
        connector: N,
    ) -> GraphResult<Graph>
    where
        C: FnMut(&NodeId, &I, &dyn Device) -> GraphResult<Box<dyn Operation>>,
        N: FnMut(&mut Node, &mut Node, &E) -> GraphResult<bool>,
    {
        skeleton::build(
            &self.nodes,
            &self.connections,
            probes,
            device,
            constructor,
            connector,
        )
    }

    /// Like [`construct`](Self::construct), accepting every connection as is.
    pub fn construct_with<C>(
        &self,
        probes: &[NodeId],
        device: &dyn Device,
        constructor: C,
    ) -> GraphResult<Graph>
    where
        C: FnMut(&NodeId, &I, &dyn Device) -> GraphResult<Box<dyn Operation>>,
    {
        self.construct(probes, device, constructor, |_, _, _| Ok(true))
    }
}
