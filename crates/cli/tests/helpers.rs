use std::fs;
use std::path::{Path, PathBuf};

use simsearch::{entry_address, load_flowgraph, load_settings, parse_u64};
use tempfile::tempdir;

const GRAPH: &str = r#"{
  "nodes": [
    {"address": 4096, "instructions": [{"mnemonic": "push"}, {"mnemonic": "ret"}]},
    {"address": 4112}
  ],
  "edges": [{"source": 4096, "destination": 4112}]
}"#;

fn write_graph(dir: &Path) -> PathBuf {
    let path = dir.join("g.json");
    fs::write(&path, GRAPH).expect("write graph");
    path
}

#[test]
fn parse_u64_accepts_hex_and_decimal() {
    assert_eq!(parse_u64("0x401000"), Ok(0x401000));
    assert_eq!(parse_u64("0XFF"), Ok(255));
    assert_eq!(parse_u64(" 42 "), Ok(42));
    assert!(parse_u64("0xzz").is_err());
    assert!(parse_u64("-1").is_err());
    assert!(parse_u64("").is_err());
}

#[test]
fn load_flowgraph_reads_exchange_file() {
    let dir = tempdir().expect("tempdir");
    let graph = load_flowgraph(&write_graph(dir.path())).expect("load");
    assert_eq!(graph.node_count(), 2);
    assert_eq!(graph.edge_count(), 1);
    assert_eq!(graph.instructions(4096).len(), 2);
}

#[test]
fn load_flowgraph_reports_path_on_failure() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("nope.json");
    let err = load_flowgraph(&missing).expect_err("missing graph");
    assert!(err.to_string().contains("Failed to read flowgraph from"));
    assert!(err.to_string().contains("nope.json"));
}

#[test]
fn entry_address_prefers_explicit_value() {
    let dir = tempdir().expect("tempdir");
    let graph = load_flowgraph(&write_graph(dir.path())).expect("load");
    assert_eq!(entry_address(&graph, None), Some(4096));
    assert_eq!(entry_address(&graph, Some(0x5000)), Some(0x5000));
    assert_eq!(entry_address(&simsearch_core::model::Flowgraph::new(), None), None);
}

#[test]
fn load_settings_defaults_without_config() {
    let settings = load_settings(None).expect("defaults");
    assert_eq!(settings.index_path, PathBuf::from("functions.simidx"));
    assert_eq!(settings.min_branching_nodes, 5);
}

#[test]
fn load_settings_reads_yaml() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("search.yaml");
    fs::write(&path, "index_path: other.simidx\nmin_branching_nodes: 2\n").expect("write");
    let settings = load_settings(Some(&path)).expect("yaml");
    assert_eq!(settings.index_path, PathBuf::from("other.simidx"));
    assert_eq!(settings.min_branching_nodes, 2);
}
