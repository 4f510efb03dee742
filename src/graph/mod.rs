//! Validated execution graphs.
//!
//! A [`Graph`] is the executable artifact produced by the builders in
//! [`crate::draft`]: a DAG of owned [`Node`]s, the input wavefront (nodes with
//! no in-graph incoming edges), the output wavefront (the probes the graph was
//! built from), and a lockable traversal cache reused by
//! [`validate`](Graph::validate) and [`sort_entries`](Graph::sort_entries).
//!
//! The topology is fixed after construction. What may still change:
//!
//! - boundary injections ([`inject_input_dependency`](Graph::inject_input_dependency),
//!   [`inject_output_dependency`](Graph::inject_output_dependency)), used to
//!   stitch graphs together;
//! - per-node bindings through [`Node::update`].
//!
//! # Example
//!
//! ```ignore
//! let graph = draft.construct(&[composite], &device, constructor, connector)?;
//! for node in graph.sorted_nodes() {
//!     // every node comes after everything it depends on
//! }
//! ```

mod traversal;

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::device::Device;
use crate::error::{GraphError, GraphResult};
use crate::node::{
    Dependency, DependencyInjection, GraphId, Node, NodeId, NodeRef, VisitState,
};
use crate::sync::{PipelineStage, SemaphoreRef};

/// A validated DAG of nodes.
#[derive(Debug)]
pub struct Graph {
    id: GraphId,
    nodes: BTreeMap<NodeId, Node>,
    /// Nodes without incoming structural edges, in discovery order.
    input_nodes: Vec<NodeId>,
    /// Probe nodes, in request order.
    output_nodes: Vec<NodeId>,
    /// Coloring cache shared by validate/sort. Holding the lock serializes them.
    traversal: Mutex<HashMap<NodeId, VisitState>>,
}

impl Graph {
    /// Assemble a graph from already linked nodes. Does not validate.
    pub(crate) fn from_parts(
        nodes: BTreeMap<NodeId, Node>,
        input_nodes: Vec<NodeId>,
        output_nodes: Vec<NodeId>,
    ) -> Self {
        Self {
            id: GraphId::mint(),
            traversal: Mutex::new(HashMap::with_capacity(nodes.len())),
            nodes,
            input_nodes,
            output_nodes,
        }
    }

    /// Add a structural edge `from -> to`.
    ///
    /// # Panics
    ///
    /// Panics if either endpoint is missing or `from == to`.
    pub(crate) fn link(
        &mut self,
        from: NodeId,
        to: NodeId,
        semaphore: SemaphoreRef,
        stage: PipelineStage,
    ) {
        let dependency = Dependency::new(from, to, semaphore, stage);
        self.nodes
            .get_mut(&from)
            .unwrap_or_else(|| panic!("link source {from} is not in the graph"))
            .push_output(dependency.clone());
        self.nodes
            .get_mut(&to)
            .unwrap_or_else(|| panic!("link target {to} is not in the graph"))
            .push_input(dependency);
    }

    /// Run `f` with mutable access to two distinct nodes.
    ///
    /// # Panics
    ///
    /// Panics if either node is missing or `first == second`.
    pub(crate) fn with_node_pair<R>(
        &mut self,
        first: NodeId,
        second: NodeId,
        f: impl FnOnce(&mut Node, &mut Node) -> R,
    ) -> R {
        assert!(first != second, "node pair must be distinct");
        let mut taken = self
            .nodes
            .remove(&first)
            .unwrap_or_else(|| panic!("node {first} is not in the graph"));
        let result = match self.nodes.get_mut(&second) {
            Some(other) => f(&mut taken, other),
            None => panic!("node {second} is not in the graph"),
        };
        self.nodes.insert(first, taken);
        result
    }

    pub(crate) fn set_input_nodes(&mut self, input_nodes: Vec<NodeId>) {
        self.input_nodes = input_nodes;
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Input wavefront: nodes with no in-graph incoming edges.
    pub fn input_nodes(&self) -> &[NodeId] {
        &self.input_nodes
    }

    /// Output wavefront: the probes this graph was built from.
    pub fn output_nodes(&self) -> &[NodeId] {
        &self.output_nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// All nodes, ordered by id.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Every structural edge, grouped by consumer in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Dependency> {
        self.nodes.values().flat_map(|node| node.inputs().iter())
    }

    pub fn edge_count(&self) -> usize {
        self.edges().count()
    }

    /// Reference to one of this graph's nodes, for injections in other graphs.
    pub fn node_ref(&self, id: NodeId) -> NodeRef {
        NodeRef::new(self.id, id)
    }

    /// Check the graph for cycles.
    ///
    /// Runs a three-color depth-first walk over input edges rooted at every
    /// output node and then at every node not yet reached, holding the
    /// traversal lock for the whole pass.
    pub fn validate(&self) -> GraphResult<()> {
        let mut colors = self.traversal.lock();
        colors.clear();

        for root in self.traversal_roots() {
            if let Err(err) = traversal::depth_first(&self.nodes, root, &mut colors, None) {
                log::debug!("Graph {} failed validation: {}", self.id, err);
                return Err(err);
            }
        }

        Ok(())
    }

    /// Topologically sorted node ids.
    ///
    /// Every node appears after everything it depends on, exactly once. The
    /// relative order of independent nodes follows construction order and
    /// must not be relied upon.
    pub fn sort_entries(&self) -> Vec<NodeId> {
        let mut colors = self.traversal.lock();
        colors.clear();

        let mut order = Vec::with_capacity(self.nodes.len());
        for root in self.traversal_roots() {
            traversal::depth_first(&self.nodes, root, &mut colors, Some(&mut order))
                .expect("a constructed graph is acyclic");
        }
        assert_eq!(
            order.len(),
            self.nodes.len(),
            "topological order must cover every node"
        );
        order
    }

    /// Output nodes first, then every node in id order.
    ///
    /// Nodes that no output reaches through structural edges (their consumer
    /// declined the connection) are still validated and sorted.
    fn traversal_roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.output_nodes
            .iter()
            .copied()
            .chain(self.nodes.keys().copied())
    }

    /// Topologically sorted nodes.
    pub fn sorted_nodes(&self) -> Vec<&Node> {
        self.sort_entries()
            .into_iter()
            .map(|id| &self.nodes[&id])
            .collect()
    }

    /// Gate `target` behind a node of another graph (or an external event).
    pub fn inject_input_dependency(
        &mut self,
        target: NodeId,
        injection: DependencyInjection,
    ) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(&target)
            .ok_or(GraphError::InjectedOpDoesntExist(target))?;
        log::trace!(
            "Graph {}: node {} now waits on {}",
            self.id,
            target,
            injection.peer()
        );
        node.push_input_injection(injection);
        Ok(())
    }

    /// Let a node of another graph (or an external observer) wait on `target`.
    pub fn inject_output_dependency(
        &mut self,
        target: NodeId,
        injection: DependencyInjection,
    ) -> GraphResult<()> {
        let node = self
            .nodes
            .get_mut(&target)
            .ok_or(GraphError::InjectedOpDoesntExist(target))?;
        log::trace!(
            "Graph {}: node {} now signals {}",
            self.id,
            target,
            injection.peer()
        );
        node.push_output_injection(injection);
        Ok(())
    }

    /// Remove every input injection whose source lives in `graph`.
    pub fn clear_injections_from(&mut self, graph: GraphId) {
        for node in self.nodes.values_mut() {
            node.remove_input_injections(|peer| peer.graph == graph);
        }
    }

    /// Remove every output injection whose target lives in `graph`.
    pub fn clear_injections_to(&mut self, graph: GraphId) {
        for node in self.nodes.values_mut() {
            node.remove_output_injections(|peer| peer.graph == graph);
        }
    }

    /// Total number of injections, inputs and outputs.
    pub fn injection_count(&self) -> usize {
        self.nodes
            .values()
            .map(|node| node.input_injections().len() + node.output_injections().len())
            .sum()
    }

    /// Refresh every node's bindings. Returns `false` if any node failed.
    pub fn update_all(&mut self) -> bool {
        let mut ok = true;
        for node in self.nodes.values_mut() {
            if !node.update() {
                log::warn!("Node {} '{}' failed to update", node.id(), node.label());
                ok = false;
            }
        }
        ok
    }

    /// Put every node back to pending for the next submission cycle.
    pub fn reset_execution_state(&self) {
        for node in self.nodes.values() {
            node.reset_execution_state();
        }
    }

    /// Deep copy for an independent graph instance (e.g. double buffering).
    ///
    /// Every operation is cloned through the device and every structural edge
    /// gets a freshly minted semaphore, so the copy never aliases this graph's
    /// synchronization. Injections are not copied: they belong to the
    /// boundary this graph was stitched into.
    pub fn clone_with(&self, device: &dyn Device) -> Graph {
        let nodes = self
            .nodes
            .iter()
            .map(|(&id, node)| (id, node.clone_unlinked(device)))
            .collect();
        let mut copy = Graph::from_parts(nodes, self.input_nodes.clone(), self.output_nodes.clone());

        for edge in self.edges() {
            copy.link(edge.from(), edge.to(), device.create_semaphore(), edge.stage());
        }

        log::debug!(
            "Cloned graph {} into {} ({} nodes)",
            self.id,
            copy.id,
            copy.node_count()
        );
        copy
    }
}

static_assertions::assert_impl_all!(Graph: Send, Sync);
