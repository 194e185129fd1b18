use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use simsearch_core::analysis::{HasherConfig, SimHasher};
use simsearch_core::model::SimHash;

use crate::load_flowgraph;

/// Hash of one flowgraph file, as emitted by `hash --json`.
#[derive(Debug, Clone, Serialize)]
pub struct HashReport {
    pub path: String,
    pub hash: SimHash,
    pub nodes: usize,
    pub edges: usize,
    pub branching_nodes: usize,
}

/// Build a hasher, loading the weight table named in the config.
pub fn build_hasher(config: &HasherConfig) -> Result<SimHasher> {
    SimHasher::from_config(config).context("Failed to load feature weights")
}

/// Compute the hash of every flowgraph file.
pub fn hash_reports(paths: &[PathBuf], config: &HasherConfig) -> Result<Vec<HashReport>> {
    let hasher = build_hasher(config)?;
    let mut reports = Vec::with_capacity(paths.len());
    for path in paths {
        let graph = load_flowgraph(path)?;
        reports.push(HashReport {
            path: path.display().to_string(),
            hash: hasher.calculate(&graph),
            nodes: graph.node_count(),
            edges: graph.edge_count(),
            branching_nodes: graph.number_of_branching_nodes(),
        });
    }
    Ok(reports)
}

/// Print the hash of each flowgraph file.
pub fn hash_command(paths: &[PathBuf], config: &HasherConfig, json: bool) -> Result<()> {
    let reports = hash_reports(paths, config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }
    for report in &reports {
        println!("{}  {}", report.hash, report.path);
    }
    Ok(())
}

/// List the features of a flowgraph with the weight each one carries.
///
/// The text output is a valid weight file, so it can seed training.
pub fn features_command(path: &Path, config: &HasherConfig, json: bool) -> Result<()> {
    let hasher = build_hasher(config)?;
    let graph = load_flowgraph(path)?;
    let (hash, features) = hasher.calculate_with_features(&graph);

    if json {
        #[derive(Serialize)]
        struct Row {
            feature: String,
            weight: f64,
        }
        let rows: Vec<Row> = features
            .iter()
            .map(|f| Row { feature: f.to_string(), weight: hasher.weight_of(f) })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("# {} features, hash {}", features.len(), hash);
    for feature in &features {
        println!("{} {}", feature, hasher.weight_of(feature));
    }
    Ok(())
}

/// Print a flowgraph in Graphviz DOT syntax.
pub fn dot_command(path: &Path) -> Result<()> {
    let graph = load_flowgraph(path)?;
    print!("{}", graph.to_dot());
    Ok(())
}
