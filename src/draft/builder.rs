//! Name-keyed graph builder.

use std::collections::HashMap;

use crate::device::Device;
use crate::error::GraphResult;
use crate::graph::Graph;
use crate::node::{Node, NodeId, Operation};
use crate::sync::PipelineStage;

use super::skeleton::{self, Connection, Declared};

/// Builder addressing nodes by unique name.
///
/// Every added node receives a sequential [`NodeId`] starting at zero, which
/// is the id it carries in the constructed [`Graph`].
#[derive(Debug, Clone)]
pub struct GraphBuilder<I, E = ()> {
    ids: HashMap<String, NodeId>,
    names: Vec<String>,
    nodes: HashMap<String, Declared<I>>,
    connections: Vec<Connection<String, E>>,
}

impl<I, E> Default for GraphBuilder<I, E> {
    fn default() -> Self {
        Self {
            ids: HashMap::new(),
            names: Vec::new(),
            nodes: HashMap::new(),
            connections: Vec::new(),
        }
    }
}

impl<I, E> GraphBuilder<I, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id.
    ///
    /// # Panics
    ///
    /// Panics if `name` is already taken.
    pub fn add_node(&mut self, name: impl Into<String>, info: I) -> NodeId {
        let name = name.into();
        assert!(
            !self.ids.contains_key(&name),
            "Node '{name}' is already declared"
        );

        let id = self.names.len() as NodeId;
        self.ids.insert(name.clone(), id);
        self.names.push(name.clone());
        self.nodes.insert(
            name.clone(),
            Declared {
                id,
                label: name,
                info,
            },
        );
        id
    }

    /// Request that `to` runs after `from`.
    pub fn connect(&mut self, from: &str, to: &str, extra: E) -> &mut Self {
        self.connect_at(from, to, PipelineStage::ALL_COMMANDS, extra)
    }

    /// Request that `to` waits for `from` at `stage`.
    pub fn connect_at(&mut self, from: &str, to: &str, stage: PipelineStage, extra: E) -> &mut Self {
        self.connections.push(Connection {
            from: from.to_string(),
            to: to.to_string(),
            stage,
            extra,
        });
        self
    }

    /// Id assigned to `name`, if declared.
    pub fn id_of(&self, name: &str) -> Option<NodeId> {
        self.ids.get(name).copied()
    }

    pub fn name_of(&self, id: NodeId) -> Option<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|index| self.names.get(index))
            .map(String::as_str)
    }

    pub fn node_count(&self) -> usize {
        self.names.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Materialize and validate the graph feeding the named probes.
    ///
    /// Errors and callback contract are the same as
    /// [`Draft::construct`](super::Draft::construct); names appear verbatim in
    /// error payloads.
    pub fn generate_execution_graph<C, N>(
        &self,
        probes: &[&str],
        device: &dyn Device,
        mut constructor: C,
        connector: N,
    ) -> GraphResult<Graph>
    where
        C: FnMut(&str, &I, &dyn Device) -> GraphResult<Box<dyn Operation>>,
        N: FnMut(&mut Node, &mut Node, &E) -> GraphResult<bool>,
    {
        let probes: Vec<String> = probes.iter().map(|probe| probe.to_string()).collect();
        skeleton::build(
            &self.nodes,
            &self.connections,
            &probes,
            device,
            |name: &String, info: &I, device: &dyn Device| constructor(name.as_str(), info, device),
            connector,
        )
    }

    /// Like [`generate_execution_graph`](Self::generate_execution_graph),
    /// accepting every connection as is.
    pub fn generate_execution_graph_with<C>(
        &self,
        probes: &[&str],
        device: &dyn Device,
        constructor: C,
    ) -> GraphResult<Graph>
    where
        C: FnMut(&str, &I, &dyn Device) -> GraphResult<Box<dyn Operation>>,
    {
        self.generate_execution_graph(probes, device, constructor, |_, _, _| Ok(true))
    }
}
