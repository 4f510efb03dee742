//! Integration tests for graph construction, validation and sorting.
//!
//! # Test Categories
//!
//! - **Construction Tests**: Draft and GraphBuilder front ends end to end
//! - **Error Tests**: Every construction error surfaced through the public API
//! - **Property Tests**: Sort order, wavefronts and edge invariants over
//!   generated topologies
//! - **Clone Tests**: Independence of cloned graphs

mod common;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rstest::rstest;

use common::{bloom_draft, chain_graph, compute, init_logging, random_dag};
use redlilium_exec_graph::{
    Device, DummyDevice, ExecutionState, Executor, ExecutorConfig, GenericOperation, GraphBuilder,
    GraphError, NodeId, Operation,
};

fn position(order: &[NodeId], id: NodeId) -> usize {
    order
        .iter()
        .position(|&entry| entry == id)
        .expect("node is in the order")
}

// ============================================================================
// Construction Tests
// ============================================================================

/// Fan-in scenario: A -> C, B -> C, probed at C.
#[test]
fn test_fan_in_scenario() {
    init_logging();
    let device = DummyDevice::new();
    let mut draft = redlilium_exec_graph::Draft::new();
    draft.add_node(0, "a").add_node(1, "b").add_node(2, "c");
    draft.connect(0, 2, ()).connect(1, 2, ());

    let graph = draft.construct_with(&[2], &device, compute).unwrap();

    let inputs: HashSet<_> = graph.input_nodes().iter().copied().collect();
    assert_eq!(inputs, HashSet::from([0, 1]));
    assert_eq!(graph.output_nodes(), &[2]);

    let order = graph.sort_entries();
    assert!(order == vec![0, 1, 2] || order == vec![1, 0, 2]);
}

#[test]
fn test_bloom_network_with_sentinel() {
    init_logging();
    let device = DummyDevice::new();
    let graph = bloom_draft()
        .construct_with(&[-1], &device, compute)
        .unwrap();

    assert_eq!(graph.node_count(), 5);
    assert_eq!(graph.edge_count(), 5);
    assert_eq!(graph.input_nodes(), &[0]);
    assert_eq!(graph.output_nodes(), &[-1]);

    let order = graph.sort_entries();
    assert_eq!(order.first(), Some(&0));
    assert_eq!(order.last(), Some(&-1));
    assert!(position(&order, 1) < position(&order, 2));
    assert!(position(&order, 2) < position(&order, 3));
}

#[rstest]
#[case::single_probe(&[-1], 5)]
#[case::mid_chain_probe(&[2], 3)]
#[case::two_probes(&[1, 3], 4)]
#[case::root_only(&[0], 1)]
fn test_probe_selects_ancestors(#[case] probes: &[NodeId], #[case] expected_nodes: usize) {
    let device = DummyDevice::new();
    let graph = bloom_draft()
        .construct_with(probes, &device, compute)
        .unwrap();

    assert_eq!(graph.node_count(), expected_nodes);
    assert_eq!(graph.output_nodes(), probes);
    assert_eq!(graph.sort_entries().len(), expected_nodes);
}

#[test]
fn test_graph_builder_generic_operations() {
    init_logging();
    let device = DummyDevice::new();
    let mut builder: GraphBuilder<u32> = GraphBuilder::new();
    builder.add_node("upload", 1);
    builder.add_node("skin", 2);
    builder.add_node("draw", 3);
    builder.add_node("present", 4);
    builder
        .connect("upload", "skin", ())
        .connect("skin", "draw", ())
        .connect("upload", "draw", ())
        .connect("draw", "present", ());

    let mut built = Vec::new();
    let graph = builder
        .generate_execution_graph_with(&["present"], &device, |name, weight, _| {
            built.push((name.to_string(), *weight));
            Ok(Box::new(GenericOperation::new(name)) as Box<dyn Operation>)
        })
        .unwrap();

    assert_eq!(built.len(), 4);
    let present = builder.id_of("present").unwrap();
    let order = graph.sort_entries();
    assert_eq!(order.last(), Some(&present));
    assert_eq!(graph.node(present).unwrap().label(), "present");
    assert_eq!(graph.input_nodes(), &[builder.id_of("upload").unwrap()]);
}

// ============================================================================
// Error Tests
// ============================================================================

#[rstest]
#[case::missing_probe(vec![], &[42], GraphError::PathDoesntExist("42".into()))]
#[case::repeated_probe(vec![], &[-1, 3, -1], GraphError::PathReferencedMoreThanOnce("-1".into()))]
#[case::self_loop(vec![(2, 2)], &[-1], GraphError::DependencyUponItself("2".into()))]
#[case::unknown_source(vec![(9, 3)], &[-1], GraphError::InvalidConnection { from: "9".into(), to: "3".into() })]
#[case::unknown_target(vec![(3, 9)], &[-1], GraphError::InvalidConnection { from: "3".into(), to: "9".into() })]
fn test_construction_errors(
    #[case] extra_edges: Vec<(NodeId, NodeId)>,
    #[case] probes: &[NodeId],
    #[case] expected: GraphError,
) {
    let device = DummyDevice::new();
    let mut draft = bloom_draft();
    for (from, to) in extra_edges {
        draft.connect(from, to, ());
    }

    let err = draft.construct_with(probes, &device, compute).unwrap_err();
    assert_eq!(err, expected);
}

#[rstest]
#[case::back_edge((3, 1))]
#[case::to_root((-1, 0))]
#[case::short((2, 1))]
fn test_cycles_rejected(#[case] back_edge: (NodeId, NodeId)) {
    let device = DummyDevice::new();
    let mut draft = bloom_draft();
    draft.connect(back_edge.0, back_edge.1, ());

    let err = draft.construct_with(&[-1], &device, compute).unwrap_err();
    assert!(matches!(err, GraphError::FoundEmbeddedCircuit(_)));
}

#[test]
fn test_constructor_error_aborts_construction() {
    let device = DummyDevice::new();
    let err = bloom_draft()
        .construct_with(&[-1], &device, |id, kernel, device| {
            if *id == 2 {
                Err(GraphError::Construction(format!("{kernel} has no binding")))
            } else {
                compute(id, kernel, device)
            }
        })
        .unwrap_err();
    assert_eq!(err, GraphError::Construction("blur_h has no binding".into()));
}

// ============================================================================
// Property Tests
// ============================================================================

#[rstest]
#[case::seed_1(1, 8)]
#[case::seed_2(2, 16)]
#[case::seed_3(3, 24)]
#[case::seed_4(4, 32)]
#[case::seed_5(5, 48)]
fn test_random_dag_invariants(#[case] seed: u64, #[case] len: NodeId) {
    let device = DummyDevice::new();
    let (draft, edges) = random_dag(seed, len);
    let probes: Vec<NodeId> = (0..len).collect();

    let mut connector_calls = 0;
    let graph = draft
        .construct(&probes, &device, compute, |_, _, _| {
            connector_calls += 1;
            Ok(true)
        })
        .unwrap();

    // Every requested connection was offered once and became an edge.
    assert_eq!(connector_calls, edges.len());
    assert_eq!(graph.edge_count(), edges.len());
    assert_eq!(device.semaphore_count(), edges.len() as u64);

    // Every node appears exactly once, after all of its inputs.
    let order = graph.sort_entries();
    assert_eq!(order.len(), len as usize);
    let positions: HashMap<NodeId, usize> =
        order.iter().enumerate().map(|(i, &id)| (id, i)).collect();
    assert_eq!(positions.len(), len as usize);
    for &(from, to) in &edges {
        assert!(positions[&from] < positions[&to], "{from} must precede {to}");
    }

    // Input wavefront is exactly the set of nodes with no incoming edges.
    let with_inputs: HashSet<NodeId> = edges.iter().map(|&(_, to)| to).collect();
    let expected: HashSet<NodeId> = (0..len).filter(|id| !with_inputs.contains(id)).collect();
    let actual: HashSet<NodeId> = graph.input_nodes().iter().copied().collect();
    assert_eq!(actual, expected);

    // No dangling edges, and both endpoints share the semaphore.
    for node in graph.nodes() {
        for dep in node.inputs() {
            let source = graph.node(dep.from()).expect("edge source exists");
            let mirror = source
                .outputs()
                .iter()
                .find(|out| out.to() == node.id())
                .expect("edge is mirrored on the source");
            assert!(Arc::ptr_eq(mirror.semaphore(), dep.semaphore()));
        }
    }

    // Sorting is repeatable.
    assert_eq!(graph.sort_entries(), order);
    graph.validate().unwrap();
}

#[test]
fn test_construction_is_deterministic() {
    let build = || {
        let device = DummyDevice::new();
        let (draft, _) = random_dag(11, 20);
        let graph = draft.construct_with(&[19, 7], &device, compute).unwrap();
        (
            graph.input_nodes().to_vec(),
            graph.sort_entries(),
            graph.edges().map(|e| (e.from(), e.to())).collect::<Vec<_>>(),
        )
    };
    assert_eq!(build(), build());
}

// ============================================================================
// Clone Tests
// ============================================================================

#[test]
fn test_clone_independence() {
    init_logging();
    let device = DummyDevice::new();
    let original = chain_graph(&device, 4);
    let copy = original.clone_with(&device);

    assert_ne!(original.id(), copy.id());
    assert_eq!(copy.sort_entries(), original.sort_entries());

    let mut executor = Executor::new(ExecutorConfig::default(), &device);
    let executed = executor.execute(&[copy.sorted_nodes()]).unwrap();
    executor.wait_for().unwrap();
    assert_eq!(executed, 4);

    for edge in copy.edges() {
        assert_eq!(edge.semaphore().signal_count(), 1);
    }
    for edge in original.edges() {
        assert_eq!(edge.semaphore().signal_count(), 0);
        let twin = copy
            .node(edge.to())
            .unwrap()
            .inputs()
            .iter()
            .find(|dep| dep.from() == edge.from())
            .unwrap();
        assert!(!Arc::ptr_eq(twin.semaphore(), edge.semaphore()));
    }
    for node in original.nodes() {
        assert_eq!(node.execution_state(), ExecutionState::Pending);
    }
}

#[test]
fn test_clone_copies_operations_through_device() {
    let device = DummyDevice::new();
    let mut original = chain_graph(&device, 2);
    original.update_all();
    let copy = original.clone_with(&device);

    let op = copy
        .node(1)
        .unwrap()
        .downcast_ref::<redlilium_exec_graph::ComputeOperation>()
        .unwrap();
    assert_eq!(op.kernel(), "chain_1");
    assert_eq!(copy.injection_count(), 0);
    assert_eq!(device.name(), "Dummy");
}
