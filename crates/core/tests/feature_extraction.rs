use std::collections::HashSet;

use simsearch_core::analysis::{FeatureExtractor, FeatureId, FeatureKind, Multiplicity};
use simsearch_core::model::{Flowgraph, Instruction};

fn five_block_graph() -> Flowgraph {
    let mut graph = Flowgraph::new();
    for (src, dst) in [(0x1000, 0x1010), (0x1000, 0x1040), (0x1040, 0x1030), (0x1010, 0x1030), (0x1010, 0x1020)]
    {
        graph.add_edge(src, dst).expect("add edge");
    }
    let blocks: [(u64, &[&str]); 5] = [
        (0x1000, &["push", "mov", "cmp", "jz"]),
        (0x1010, &["mov", "test", "jnz"]),
        (0x1020, &["mov", "call", "ret"]),
        (0x1030, &["xor", "pop", "ret"]),
        (0x1040, &["add", "jmp"]),
    ];
    for (addr, mnemonics) in blocks {
        let insns = mnemonics.iter().map(|m| Instruction::bare(*m)).collect();
        graph.add_instructions(addr, insns).expect("instructions");
    }
    graph
}

fn count(features: &[simsearch_core::analysis::Feature], kind: FeatureKind) -> usize {
    features.iter().filter(|f| f.kind == kind).count()
}

#[test]
fn extracts_graphlets_then_mnemonic_trigrams() {
    let features = FeatureExtractor::new().extract(&five_block_graph());
    // 5 nodes at 3 distances, and 15 mnemonics give 13 trigrams.
    assert_eq!(features.len(), 28);
    assert_eq!(count(&features, FeatureKind::Graphlet), 15);
    assert_eq!(count(&features, FeatureKind::MnemonicTuple), 13);
    assert!(features[..15].iter().all(|f| f.kind == FeatureKind::Graphlet));
}

#[test]
fn extraction_is_deterministic() {
    let extractor = FeatureExtractor::new();
    assert_eq!(extractor.extract(&five_block_graph()), extractor.extract(&five_block_graph()));
}

#[test]
fn feature_ids_are_unique_under_both_policies() {
    for multiplicity in [Multiplicity::OccurrenceTagged, Multiplicity::Once] {
        let features =
            FeatureExtractor::new().with_multiplicity(multiplicity).extract(&five_block_graph());
        let ids: HashSet<FeatureId> = features.iter().map(|f| f.id).collect();
        assert_eq!(ids.len(), features.len(), "duplicate ids under {multiplicity:?}");
    }
}

#[test]
fn repeated_trigram_counts_depend_on_multiplicity() {
    let mut graph = Flowgraph::new();
    graph.add_node(0x10);
    graph.add_instructions(0x10, vec![Instruction::bare("mov"); 4]).expect("instructions");

    let tagged = FeatureExtractor::new().extract(&graph);
    assert_eq!(count(&tagged, FeatureKind::MnemonicTuple), 2);
    assert_eq!(count(&tagged, FeatureKind::Graphlet), 3);

    let once = FeatureExtractor::new().with_multiplicity(Multiplicity::Once).extract(&graph);
    assert_eq!(count(&once, FeatureKind::MnemonicTuple), 1);
    // An isolated node looks the same at every distance.
    assert_eq!(count(&once, FeatureKind::Graphlet), 1);
}

#[test]
fn disabling_mnemonics_leaves_only_graphlets() {
    let features = FeatureExtractor::new().with_mnemonics(false).extract(&five_block_graph());
    assert_eq!(features.len(), 15);
    assert_eq!(count(&features, FeatureKind::MnemonicTuple), 0);
}

#[test]
fn oversized_neighbourhoods_are_skipped() {
    // Star: one hub with 40 leaves, so every distance-1 neighbourhood of the
    // hub exceeds the cap while each leaf at distance 1 has just two nodes.
    let mut graph = Flowgraph::new();
    for leaf in 1..=40u64 {
        graph.add_edge(0, leaf).expect("edge");
    }
    let extractor = FeatureExtractor { graphlet_distances: vec![1], ..FeatureExtractor::new() };
    let features = extractor.extract(&graph);
    assert_eq!(features.len(), 40);
}

#[test]
fn feature_ids_parse_with_and_without_kind_tag() {
    let id = FeatureId(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
    let text = id.to_string();
    assert_eq!(text, "0123456789abcdef0011223344556677");
    assert_eq!(text.parse::<FeatureId>().expect("plain"), id);
    assert_eq!(format!("G.{text}").parse::<FeatureId>().expect("tagged"), id);
    assert!("xyz".parse::<FeatureId>().is_err());
    assert!("G.1234".parse::<FeatureId>().is_err());
}
