//! Depth-first traversal over input edges.
//!
//! Shared by [`Graph::validate`](super::Graph::validate) and
//! [`Graph::sort_entries`](super::Graph::sort_entries). The color map is the
//! graph's traversal cache and must be held under the graph lock.

use std::collections::{BTreeMap, HashMap};

use crate::error::{GraphError, GraphResult};
use crate::node::{Node, NodeId, VisitState};

/// Walk every ancestor of `root`, coloring nodes as it goes.
///
/// When `order` is given, each node is appended after all of its inputs
/// (post-order), which is a valid execution order. Meeting a node that is
/// still [`VisitState::Visiting`] means a back edge: the graph has a cycle.
pub(super) fn depth_first(
    nodes: &BTreeMap<NodeId, Node>,
    root: NodeId,
    colors: &mut HashMap<NodeId, VisitState>,
    mut order: Option<&mut Vec<NodeId>>,
) -> GraphResult<()> {
    if colors.get(&root).copied().unwrap_or_default() == VisitState::Visited {
        return Ok(());
    }

    // (node, index of the next input edge to follow)
    let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
    colors.insert(root, VisitState::Visiting);

    while let Some(top) = stack.last_mut() {
        let (id, cursor) = *top;
        let node = nodes
            .get(&id)
            .unwrap_or_else(|| panic!("dependency references missing node {id}"));

        match node.inputs().get(cursor) {
            Some(dependency) => {
                top.1 += 1;
                let next = dependency.from();
                match colors.get(&next).copied().unwrap_or_default() {
                    VisitState::Pending => {
                        colors.insert(next, VisitState::Visiting);
                        stack.push((next, 0));
                    }
                    VisitState::Visiting => return Err(GraphError::FoundEmbeddedCircuit(next)),
                    VisitState::Visited => {}
                }
            }
            None => {
                colors.insert(id, VisitState::Visited);
                if let Some(order) = order.as_deref_mut() {
                    order.push(id);
                }
                stack.pop();
            }
        }
    }

    Ok(())
}
