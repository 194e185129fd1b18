use std::collections::BTreeMap;

use simsearch_core::model::{Direction, EdgePolicy, Flowgraph, FlowgraphError, Instruction};

fn diamond() -> Flowgraph {
    // 1 -> 2, 1 -> 3, 2 -> 4, 3 -> 4
    let mut graph = Flowgraph::new();
    for (src, dst) in [(1, 2), (1, 3), (2, 4), (3, 4)] {
        graph.add_edge(src, dst).expect("add edge");
    }
    graph
}

#[test]
fn add_node_and_edge_are_idempotent() {
    let mut graph = Flowgraph::new();
    assert!(graph.add_node(0x10));
    assert!(!graph.add_node(0x10));
    assert!(graph.add_edge(0x10, 0x20).expect("edge"));
    assert!(!graph.add_edge(0x10, 0x20).expect("duplicate edge"));
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
}

#[test]
fn edges_auto_create_missing_endpoints_by_default() {
    let mut graph = Flowgraph::new();
    graph.add_edge(0x30, 0x40).expect("edge");
    assert!(graph.has_node(0x30));
    assert!(graph.has_node(0x40));
    assert_eq!(graph.nodes().collect::<Vec<_>>(), vec![0x30, 0x40]);
}

#[test]
fn strict_policy_rejects_unknown_endpoints_without_changes() {
    let mut graph = Flowgraph::with_policy(EdgePolicy::Strict);
    graph.add_node(0x10);
    let err = graph.add_edge(0x10, 0x20).expect_err("strict edge");
    assert!(matches!(err, FlowgraphError::UnknownNode(0x20)));
    assert_eq!(graph.node_count(), 1);
    assert_eq!(graph.edge_count(), 0);

    graph.add_node(0x20);
    assert!(graph.add_edge(0x10, 0x20).expect("both known"));
}

#[test]
fn instructions_on_unknown_node_fail() {
    let mut graph = Flowgraph::new();
    let err = graph
        .add_instructions(0x99, vec![Instruction::bare("ret")])
        .expect_err("unknown node");
    assert!(matches!(err, FlowgraphError::UnknownNode(0x99)));
    assert!(graph.is_empty());
}

#[test]
fn instructions_last_write_wins() {
    let mut graph = Flowgraph::new();
    graph.add_node(0x10);
    graph.add_instructions(0x10, vec![Instruction::bare("nop")]).expect("first");
    graph
        .add_instructions(0x10, vec![Instruction::new("mov", vec!["eax".into(), "1".into()])])
        .expect("second");
    assert_eq!(graph.instructions(0x10).len(), 1);
    assert_eq!(graph.instructions(0x10)[0].to_string(), "mov eax, 1");
    assert!(graph.instructions(0x20).is_empty());
}

#[test]
fn counts_branching_nodes() {
    assert_eq!(diamond().number_of_branching_nodes(), 1);

    let mut graph = diamond();
    graph.add_edge(2, 5).expect("edge");
    assert_eq!(graph.number_of_branching_nodes(), 2);
    assert_eq!(Flowgraph::new().number_of_branching_nodes(), 0);
}

#[test]
fn successors_and_predecessors_are_sorted() {
    let graph = diamond();
    assert_eq!(graph.successors(1).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(graph.predecessors(4).collect::<Vec<_>>(), vec![2, 3]);
    assert_eq!(graph.edges().collect::<Vec<_>>(), vec![(1, 2), (1, 3), (2, 4), (3, 4)]);
}

#[test]
fn distances_follow_direction() {
    let graph = diamond();
    let forward = graph.distances(1, Direction::Forward);
    assert_eq!(forward, BTreeMap::from([(1, 0), (2, 1), (3, 1), (4, 2)]));

    let backward = graph.distances(2, Direction::Backward);
    assert_eq!(backward, BTreeMap::from([(1, 1), (2, 0), (3, -1), (4, -1)]));

    let both = graph.distances(2, Direction::Bidirectional);
    assert_eq!(both, BTreeMap::from([(1, 1), (2, 0), (3, 2), (4, 1)]));
}

#[test]
fn subgraph_collects_neighbourhood_and_internal_edges() {
    let graph = diamond();
    let sub = graph.subgraph(2, 1, 30).expect("small subgraph");
    assert_eq!(sub.nodes().collect::<Vec<_>>(), vec![1, 2, 4]);
    assert_eq!(sub.edges().collect::<Vec<_>>(), vec![(1, 2), (2, 4)]);

    let whole = graph.subgraph(2, 2, 30).expect("whole graph");
    assert_eq!(whole.edge_count(), 4);

    assert!(graph.subgraph(2, 2, 3).is_none());
    assert!(graph.subgraph(0x77, 1, 30).is_none());
}

#[test]
fn structural_hash_ignores_addresses() {
    let relocated = {
        let mut graph = Flowgraph::new();
        for (src, dst) in [(0x501, 0x502), (0x501, 0x503), (0x502, 0x504), (0x503, 0x504)] {
            graph.add_edge(src, dst).expect("edge");
        }
        graph
    };
    let keys = (0x1111, 0x2222, 0x3333);
    assert_eq!(
        diamond().structural_hash(1, keys.0, keys.1, keys.2),
        relocated.structural_hash(0x501, keys.0, keys.1, keys.2)
    );
    assert_ne!(
        diamond().structural_hash(1, keys.0, keys.1, keys.2),
        diamond().structural_hash(4, keys.0, keys.1, keys.2)
    );
}

#[test]
fn renders_dot() {
    let mut graph = Flowgraph::new();
    graph.add_edge(0x10, 0x2f).expect("edge");
    let dot = graph.to_dot();
    assert!(dot.starts_with("digraph G {"));
    assert!(dot.contains("blk_10 -> blk_2f;"));
    assert!(dot.trim_end().ends_with('}'));
}
