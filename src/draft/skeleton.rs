//! Dependency-skeleton construction shared by [`Draft`](super::Draft) and
//! [`GraphBuilder`](super::GraphBuilder).
//!
//! The front ends differ only in how nodes are keyed (numeric id or name) and
//! in the callbacks they accept; the walk itself lives here.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::device::Device;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::node::{Node, NodeId, Operation};
use crate::sync::PipelineStage;

/// A node as submitted to a builder, before it is materialized.
#[derive(Debug, Clone)]
pub(crate) struct Declared<I> {
    pub id: NodeId,
    pub label: String,
    pub info: I,
}

/// A requested dependency `from -> to`.
#[derive(Debug, Clone)]
pub(crate) struct Connection<K, E> {
    pub from: K,
    pub to: K,
    pub stage: PipelineStage,
    pub extra: E,
}

/// Index the flat connection list by consumer: each node maps to the indices
/// of its incoming connections, in submission order.
pub(crate) fn construct_paths<K, E>(connections: &[Connection<K, E>]) -> HashMap<&K, Vec<usize>>
where
    K: Eq + Hash,
{
    let mut paths: HashMap<&K, Vec<usize>> = HashMap::new();
    for (index, connection) in connections.iter().enumerate() {
        paths.entry(&connection.to).or_default().push(index);
    }
    paths
}

/// Key addressing a declared node: a [`NodeId`] or a name.
pub(crate) trait NodeKey: Eq + Hash + fmt::Debug {
    /// Rendering used in error payloads.
    fn describe(&self) -> String;
}

impl NodeKey for NodeId {
    fn describe(&self) -> String {
        self.to_string()
    }
}

impl NodeKey for String {
    fn describe(&self) -> String {
        self.clone()
    }
}

/// Build a validated graph from declared nodes and connections.
///
/// Walks backward from every probe, calling `constructor` once per distinct
/// reachable node and `connector` once per incoming connection of a reachable
/// node. A connection the connector accepts becomes a structural dependency
/// with a freshly minted semaphore (one per distinct node pair).
pub(crate) fn build<K, I, E, C, N>(
    nodes: &HashMap<K, Declared<I>>,
    connections: &[Connection<K, E>],
    probes: &[K],
    device: &dyn Device,
    mut constructor: C,
    mut connector: N,
) -> GraphResult<Graph>
where
    K: NodeKey,
    C: FnMut(&K, &I, &dyn Device) -> GraphResult<Box<dyn Operation>>,
    N: FnMut(&mut Node, &mut Node, &E) -> GraphResult<bool>,
{
    let mut requested = HashSet::with_capacity(probes.len());
    for probe in probes {
        if !nodes.contains_key(probe) {
            return Err(GraphError::PathDoesntExist(probe.describe()));
        }
        if !requested.insert(probe) {
            return Err(GraphError::PathReferencedMoreThanOnce(probe.describe()));
        }
    }

    let paths = construct_paths(connections);

    for connection in connections {
        if connection.from == connection.to {
            return Err(GraphError::DependencyUponItself(connection.from.describe()));
        }
        if !nodes.contains_key(&connection.from) || !nodes.contains_key(&connection.to) {
            return Err(GraphError::InvalidConnection {
                from: connection.from.describe(),
                to: connection.to.describe(),
            });
        }
    }

    // Materialize every ancestor of the probes, each exactly once.
    let mut built = BTreeMap::new();
    let mut visited: HashSet<&K> = HashSet::new();
    let mut order: Vec<&K> = Vec::new();

    for probe in probes {
        let mut stack = vec![probe];
        while let Some(key) = stack.pop() {
            if !visited.insert(key) {
                continue;
            }

            let declared = &nodes[key];
            let operation = constructor(key, &declared.info, device)?;
            built.insert(
                declared.id,
                Node::new(declared.id, declared.label.clone(), operation),
            );
            order.push(key);

            if let Some(incoming) = paths.get(key) {
                // Reversed so the first declared connection is expanded first.
                for &index in incoming.iter().rev() {
                    let from = &connections[index].from;
                    if !visited.contains(from) {
                        stack.push(from);
                    }
                }
            }
        }
    }

    let outputs = probes.iter().map(|probe| nodes[probe].id).collect();
    let mut graph = Graph::from_parts(built, Vec::new(), outputs);

    // Wire edges once every endpoint exists.
    let mut linked = HashSet::new();
    for &key in &order {
        let to = nodes[key].id;
        let Some(incoming) = paths.get(key) else {
            continue;
        };
        for &index in incoming {
            let connection = &connections[index];
            let from = nodes[&connection.from].id;

            let accepted = graph.with_node_pair(from, to, |from_node, to_node| {
                connector(from_node, to_node, &connection.extra)
            })?;
            if accepted && linked.insert((from, to)) {
                graph.link(from, to, device.create_semaphore(), connection.stage);
            }
        }
    }

    let inputs = order
        .iter()
        .map(|key| nodes[*key].id)
        .filter(|id| graph.node(*id).is_some_and(|node| node.inputs().is_empty()))
        .collect();
    graph.set_input_nodes(inputs);

    graph.validate()?;

    log::debug!(
        "Constructed graph {} on {}: {} nodes, {} edges, {} inputs, {} outputs",
        graph.id(),
        device.name(),
        graph.node_count(),
        graph.edge_count(),
        graph.input_nodes().len(),
        graph.output_nodes().len()
    );

    Ok(graph)
}
