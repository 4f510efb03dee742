//! Common utilities for execution graph integration tests.
//!
//! Graph fixtures, a deterministic random DAG generator, and a queue that
//! retires work on a background thread.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use redlilium_exec_graph::{
    Command, ComputeOperation, Device, Draft, Ensemble, ExecResult, Graph, GraphResult, NodeId,
    NodeRef, Operation, SubmitQueue, Submission,
};

/// Initialize test logging once per process.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ============================================================================
// Graph Fixtures
// ============================================================================

/// Constructor building a unit-sized compute dispatch per node.
pub fn compute(id: &NodeId, kernel: &&str, _device: &dyn Device) -> GraphResult<Box<dyn Operation>> {
    Ok(Box::new(ComputeOperation::new(format!("{kernel}_{id}"), [1, 1, 1])))
}

/// Linear chain `0 -> 1 -> ... -> len-1`.
pub fn chain_draft(len: NodeId) -> Draft<&'static str> {
    let mut draft = Draft::new();
    for id in 0..len {
        draft.add_node(id, "chain");
    }
    for id in 1..len {
        draft.connect(id - 1, id, ());
    }
    draft
}

/// Build a chain and probe its last node.
pub fn chain_graph(device: &dyn Device, len: NodeId) -> Graph {
    chain_draft(len)
        .construct_with(&[len - 1], device, compute)
        .expect("chain is valid")
}

/// Two-stage bloom network with a negative sentinel for the composite stage.
///
/// ```text
///   0 (scene) ──▶ 1 (threshold) ──▶ 2 (blur_h) ──▶ 3 (blur_v) ──┐
///        │                                                      ▼
///        └──────────────────────────────────────────────────▶ -1 (composite)
/// ```
pub fn bloom_draft() -> Draft<&'static str> {
    let mut draft = Draft::new();
    draft
        .add_node(0, "scene")
        .add_node(1, "threshold")
        .add_node(2, "blur_h")
        .add_node(3, "blur_v")
        .add_node(-1, "composite");
    draft
        .connect(0, 1, ())
        .connect(1, 2, ())
        .connect(2, 3, ())
        .connect(3, -1, ())
        .connect(0, -1, ());
    draft
}

/// Random DAG over `0..len`: edges only go from lower to higher ids.
///
/// Returns the draft and the edge list. Every node is probed.
pub fn random_dag(seed: u64, len: NodeId) -> (Draft<&'static str>, Vec<(NodeId, NodeId)>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut draft = Draft::new();
    let mut edges = Vec::new();
    for id in 0..len {
        draft.add_node(id, "random");
    }
    for to in 1..len {
        for from in 0..to {
            if rng.random_ratio(1, 4) {
                draft.connect(from, to, ());
                edges.push((from, to));
            }
        }
    }
    (draft, edges)
}

// ============================================================================
// Ensemble Inspection
// ============================================================================

/// Every ordering edge of an ensemble, structural or injected.
pub fn dependency_set(ensemble: &Ensemble) -> BTreeSet<(NodeRef, NodeRef)> {
    let mut set = BTreeSet::new();
    for graph in ensemble.graphs() {
        for edge in graph.edges() {
            set.insert((graph.node_ref(edge.from()), graph.node_ref(edge.to())));
        }
        for node in graph.nodes() {
            let this = graph.node_ref(node.id());
            for injection in node.output_injections() {
                set.insert((this, injection.peer()));
            }
            for injection in node.input_injections() {
                set.insert((injection.peer(), this));
            }
        }
    }
    set
}

/// The flat submission sequence of an ensemble.
pub fn node_sequence(ensemble: &Ensemble) -> Vec<NodeRef> {
    ensemble
        .graphs()
        .into_iter()
        .flat_map(|graph| {
            graph
                .sort_entries()
                .into_iter()
                .map(move |id| graph.node_ref(id))
        })
        .collect()
}

// ============================================================================
// Delayed Queue
// ============================================================================

/// Queue that retires each submission after `latency` on a worker thread.
///
/// Semaphores are signaled at submit time; only the fence is delayed, which
/// is what execution-unit reuse observes.
#[derive(Debug)]
pub struct DelayedQueue {
    latency: Duration,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
    submitted: AtomicUsize,
    labels: parking_lot::Mutex<Vec<String>>,
}

impl DelayedQueue {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
            submitted: AtomicUsize::new(0),
            labels: parking_lot::Mutex::new(Vec::new()),
        }
    }

    pub fn submitted(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    /// Highest number of submissions that were in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn labels(&self) -> Vec<String> {
        self.labels.lock().clone()
    }
}

impl SubmitQueue for DelayedQueue {
    fn submit(&self, submission: Submission<'_>) -> ExecResult<()> {
        assert!(
            matches!(submission.commands.first(), Some(Command::Marker(_))),
            "every submission starts with a marker"
        );
        self.labels.lock().push(submission.label.to_string());
        self.submitted.fetch_add(1, Ordering::SeqCst);

        for semaphore in &submission.signal {
            semaphore.signal();
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

        let fence = submission.fence.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let latency = self.latency;
        thread::spawn(move || {
            thread::sleep(latency);
            in_flight.fetch_sub(1, Ordering::SeqCst);
            fence.signal();
        });
        Ok(())
    }
}
