//! Composition of graphs into sequences.
//!
//! An [`Ensemble`] is a tree: a leaf holds an ordered run of [`Graph`]s whose
//! boundaries are serialized by injected dependencies, an internal node holds
//! child ensembles that are only ordered once [`flatten`](Ensemble::flatten)ed.
//!
//! ```text
//!   Ensembles ─┬─ Graphs [front_end]
//!              ├─ Graphs [gbuffer, lighting]      flatten
//!              └─ Graphs [post, ui]            ───────────▶  Graphs [front_end, gbuffer, lighting, post, ui]
//!                                              ◀───────────
//!                                              heapify(&[1, 3])
//! ```
//!
//! Restructuring consumes the ensemble and returns a new one, so a tree is
//! never observed half rebuilt.

use crate::device::Device;
use crate::error::{EnsembleError, EnsembleResult, GraphResult};
use crate::graph::Graph;
use crate::node::{DependencyInjection, Node, NodeRef};
use crate::sync::PipelineStage;

/// Signal returned by traversal visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Keep going.
    Success,
    /// From an ensemble visitor: skip this subtree. From a graph visitor:
    /// skip the remaining graphs of the current leaf.
    Skip,
    /// Stop the whole walk.
    Quit,
}

/// Tree of graphs.
#[derive(Debug)]
pub enum Ensemble {
    /// Serialized run of graphs.
    Graphs(Vec<Graph>),
    /// Child ensembles, unordered relative to each other until flattened.
    Ensembles(Vec<Ensemble>),
}

impl Ensemble {
    /// Wrap `graphs` as a leaf, serializing every consecutive boundary.
    pub fn make_seq(mut graphs: Vec<Graph>, device: &dyn Device) -> EnsembleResult<Ensemble> {
        for seam in 1..graphs.len() {
            let (head, tail) = graphs.split_at_mut(seam);
            serialize_boundary(&mut head[seam - 1], &mut tail[0], device)?;
        }
        log::debug!("Built ensemble sequence of {} graphs", graphs.len());
        Ok(Ensemble::Graphs(graphs))
    }

    /// Group child ensembles without ordering them.
    pub fn from_ensembles(children: Vec<Ensemble>) -> Ensemble {
        Ensemble::Ensembles(children)
    }

    /// `true` for a leaf.
    pub fn is_flat(&self) -> bool {
        matches!(self, Ensemble::Graphs(_))
    }

    /// Merge the tree into a single leaf.
    ///
    /// Leaves keep their internal serialization; a fresh boundary is
    /// serialized wherever two children meet. Empty children are dropped.
    pub fn flatten(self, device: &dyn Device) -> EnsembleResult<Ensemble> {
        let graphs = self.into_flat_graphs(device)?;
        log::debug!("Flattened ensemble into {} graphs", graphs.len());
        Ok(Ensemble::Graphs(graphs))
    }

    fn into_flat_graphs(self, device: &dyn Device) -> EnsembleResult<Vec<Graph>> {
        match self {
            Ensemble::Graphs(graphs) => Ok(graphs),
            Ensemble::Ensembles(children) => {
                let mut merged: Vec<Graph> = Vec::new();
                for child in children {
                    let mut part = child.into_flat_graphs(device)?;
                    if let (Some(prev), Some(next)) = (merged.last_mut(), part.first_mut()) {
                        serialize_boundary(prev, next, device)?;
                    }
                    merged.append(&mut part);
                }
                Ok(merged)
            }
        }
    }

    /// Split a flat ensemble at `cuts` into independent leaves.
    ///
    /// Each cut `c` starts a new leaf at graph `c`; cuts must be strictly
    /// increasing and lie in `1..len`. The injected boundary between graphs
    /// `c - 1` and `c` is removed, other injections are kept.
    pub fn heapify(self, cuts: &[usize]) -> EnsembleResult<Ensemble> {
        let Ensemble::Graphs(mut graphs) = self else {
            return Err(EnsembleError::NotFlat);
        };

        let len = graphs.len();
        let mut previous = 0;
        for &cut in cuts {
            if cut <= previous || cut >= len {
                return Err(EnsembleError::InvalidCut { index: cut, len });
            }
            previous = cut;
        }

        for &cut in cuts {
            let (head, tail) = graphs.split_at_mut(cut);
            let prev = &mut head[cut - 1];
            let next = &mut tail[0];
            prev.clear_injections_to(next.id());
            next.clear_injections_from(prev.id());
        }

        let mut leaves = Vec::with_capacity(cuts.len() + 1);
        for &cut in cuts.iter().rev() {
            leaves.push(Ensemble::Graphs(graphs.split_off(cut)));
        }
        leaves.push(Ensemble::Graphs(graphs));
        leaves.reverse();

        log::debug!("Heapified {} graphs into {} leaves", len, leaves.len());
        Ok(Ensemble::Ensembles(leaves))
    }

    /// Depth-first walk.
    ///
    /// `on_ensemble` sees every tree node before its contents, `on_graph`
    /// sees every graph of every visited leaf in sequence order. Returns
    /// [`Visit::Quit`] if a visitor quit, [`Visit::Success`] otherwise.
    pub fn traverse<'a, G, E>(&'a self, on_graph: &mut G, on_ensemble: &mut E) -> Visit
    where
        G: FnMut(&'a Graph) -> Visit,
        E: FnMut(&'a Ensemble) -> Visit,
    {
        match on_ensemble(self) {
            Visit::Quit => return Visit::Quit,
            Visit::Skip => return Visit::Success,
            Visit::Success => {}
        }

        match self {
            Ensemble::Graphs(graphs) => {
                for graph in graphs {
                    match on_graph(graph) {
                        Visit::Quit => return Visit::Quit,
                        Visit::Skip => break,
                        Visit::Success => {}
                    }
                }
            }
            Ensemble::Ensembles(children) => {
                for child in children {
                    if child.traverse(on_graph, on_ensemble) == Visit::Quit {
                        return Visit::Quit;
                    }
                }
            }
        }
        Visit::Success
    }

    /// Mutable counterpart of [`traverse`](Self::traverse), visiting graphs only.
    pub fn traverse_mut<G>(&mut self, on_graph: &mut G) -> Visit
    where
        G: FnMut(&mut Graph) -> Visit,
    {
        match self {
            Ensemble::Graphs(graphs) => {
                for graph in graphs {
                    match on_graph(graph) {
                        Visit::Quit => return Visit::Quit,
                        Visit::Skip => break,
                        Visit::Success => {}
                    }
                }
            }
            Ensemble::Ensembles(children) => {
                for child in children {
                    if child.traverse_mut(on_graph) == Visit::Quit {
                        return Visit::Quit;
                    }
                }
            }
        }
        Visit::Success
    }

    /// All graphs in sequence order.
    pub fn graphs(&self) -> Vec<&Graph> {
        let mut graphs = Vec::new();
        self.traverse(
            &mut |graph| {
                graphs.push(graph);
                Visit::Success
            },
            &mut |_| Visit::Success,
        );
        graphs
    }

    pub fn graph_count(&self) -> usize {
        let mut count = 0;
        self.traverse(
            &mut |_| {
                count += 1;
                Visit::Success
            },
            &mut |_| Visit::Success,
        );
        count
    }

    /// Input wavefront of the first graph.
    pub fn input_wavefront(&self) -> Vec<NodeRef> {
        let mut wavefront = Vec::new();
        self.traverse(
            &mut |graph| {
                wavefront.extend(graph.input_nodes().iter().map(|&id| graph.node_ref(id)));
                Visit::Quit
            },
            &mut |_| Visit::Success,
        );
        wavefront
    }

    /// Output wavefront of the last graph.
    pub fn output_wavefront(&self) -> Vec<NodeRef> {
        let mut last = None;
        self.traverse(
            &mut |graph| {
                last = Some(graph);
                Visit::Success
            },
            &mut |_| Visit::Success,
        );
        last.map(|graph| {
            graph
                .output_nodes()
                .iter()
                .map(|&id| graph.node_ref(id))
                .collect()
        })
        .unwrap_or_default()
    }

    /// Every node, graph by graph, each graph topologically sorted.
    pub fn sort_entries(&self) -> Vec<&Node> {
        let mut entries = Vec::new();
        self.traverse(
            &mut |graph| {
                entries.extend(graph.sorted_nodes());
                Visit::Success
            },
            &mut |_| Visit::Success,
        );
        entries
    }

    /// Sorted nodes grouped per leaf, ready for [`Executor::execute`](crate::executor::Executor::execute).
    pub fn grouped_entries(&self) -> Vec<Vec<&Node>> {
        let mut groups = Vec::new();
        self.traverse(&mut |_| Visit::Success, &mut |ensemble| {
            if let Ensemble::Graphs(graphs) = ensemble {
                groups.push(graphs.iter().flat_map(Graph::sorted_nodes).collect());
            }
            Visit::Success
        });
        groups
    }

    /// Refresh the bindings of every node. Returns `false` if any node failed.
    pub fn update_all(&mut self) -> bool {
        let mut ok = true;
        self.traverse_mut(&mut |graph| {
            ok &= graph.update_all();
            Visit::Success
        });
        ok
    }
}

/// Gate every input of `next` behind every output of `prev`.
///
/// Each (output, input) pair gets its own semaphore, shared by the output
/// injection on `prev` and the input injection on `next`.
fn serialize_boundary(prev: &mut Graph, next: &mut Graph, device: &dyn Device) -> GraphResult<()> {
    let outputs = prev.output_nodes().to_vec();
    let inputs = next.input_nodes().to_vec();

    for &x in &outputs {
        for &y in &inputs {
            let semaphore = device.create_semaphore();
            prev.inject_output_dependency(
                x,
                DependencyInjection::new(
                    next.node_ref(y),
                    semaphore.clone(),
                    PipelineStage::ALL_COMMANDS,
                ),
            )?;
            next.inject_input_dependency(
                y,
                DependencyInjection::new(prev.node_ref(x), semaphore, PipelineStage::ALL_COMMANDS),
            )?;
        }
    }

    log::trace!(
        "Serialized boundary {} -> {} ({} pairs)",
        prev.id(),
        next.id(),
        outputs.len() * inputs.len()
    );
    Ok(())
}

static_assertions::assert_impl_all!(Ensemble: Send, Sync);
