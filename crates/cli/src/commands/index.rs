use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::Serialize;
use simsearch_core::db::{IndexError, IndexLayout, IndexOptions, MetadataStore, SearchConfig, SearchIndex};
use simsearch_core::services::{IndexOutcome, ScoredMatch, SearchService};

use crate::commands::hashing::build_hasher;
use crate::{entry_address, load_flowgraph};

/// Outcome of `add` across all input files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddSummary {
    pub indexed: usize,
    pub skipped: usize,
    /// Set when the index ran low on space before every file was stored.
    pub stopped_early: bool,
}

/// A query hit joined with the metadata sidecar, if it has an entry.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRow {
    #[serde(flatten)]
    pub hit: ScoredMatch,
    pub file_name: Option<String>,
    pub function_name: Option<String>,
    pub vulnerable: bool,
}

fn open_index(path: &Path) -> Result<SearchIndex> {
    SearchIndex::open(path).with_context(|| format!("Failed to open index at {}", path.display()))
}

/// Create a new, empty index file.
pub fn create_index_command(path: &Path, options: IndexOptions) -> Result<()> {
    let index = SearchIndex::create(path, options)
        .with_context(|| format!("Failed to create index at {}", path.display()))?;

    println!("Created index:");
    println!("  Path: {}", path.display());
    println!("  Capacity: {} bytes", index.capacity_bytes());
    println!("  Permutations: {}", index.permutations());
    println!("  Bytes per record: {}", index.bytes_per_record());
    Ok(())
}

/// Hash flowgraph files and add them to an existing index.
///
/// Graphs below the branching-node gate are skipped. When the index runs low
/// on space the remaining files are left out and the summary says so.
pub fn add_functions(
    index_path: &Path,
    graphs: &[PathBuf],
    executable_id: u64,
    address: Option<u64>,
    settings: &SearchConfig,
) -> Result<AddSummary> {
    if address.is_some() && graphs.len() > 1 {
        return Err(anyhow!("--address only makes sense with a single flowgraph"));
    }
    let hasher = build_hasher(&settings.hasher)?;
    let service = SearchService::new(hasher, open_index(index_path)?)
        .with_min_branching_nodes(settings.min_branching_nodes)
        .with_low_space_threshold(settings.low_space_threshold);

    let mut summary = AddSummary::default();
    for path in graphs {
        let graph = load_flowgraph(path)?;
        let Some(function_address) = entry_address(&graph, address) else {
            warn!("{} has no blocks; skipping", path.display());
            summary.skipped += 1;
            continue;
        };
        match service.index_function(&graph, executable_id, function_address) {
            Ok(IndexOutcome::Indexed(hash)) => {
                info!("indexed {} at {function_address:#x} as {hash}", path.display());
                summary.indexed += 1;
            }
            Ok(IndexOutcome::BelowThreshold { branching_nodes }) => {
                info!("skipped {} ({branching_nodes} branching nodes)", path.display());
                summary.skipped += 1;
            }
            Err(IndexError::CapacityExhausted { free, .. }) => {
                warn!("index is full ({free} bytes free); run grow-index and add the rest");
                summary.stopped_early = true;
                break;
            }
            Err(err) => {
                return Err(err).with_context(|| format!("Failed to index {}", path.display()));
            }
        }
    }
    Ok(summary)
}

pub fn add_command(
    index_path: &Path,
    graphs: &[PathBuf],
    executable_id: u64,
    address: Option<u64>,
    settings: &SearchConfig,
) -> Result<()> {
    let summary = add_functions(index_path, graphs, executable_id, address, settings)?;
    println!("Indexed: {}", summary.indexed);
    println!("Skipped: {}", summary.skipped);
    if summary.stopped_early {
        println!("Stopped early: index is out of space");
    }
    Ok(())
}

/// Query the index with a flowgraph and join the hits with metadata.
pub fn query_rows(
    index_path: &Path,
    graph_path: &Path,
    count: usize,
    settings: &SearchConfig,
) -> Result<Vec<QueryRow>> {
    let hasher = build_hasher(&settings.hasher)?;
    let service = SearchService::new(hasher, open_index(index_path)?);
    let graph = load_flowgraph(graph_path)?;
    let matches = service.search(&graph, count).context("Query failed")?;

    let layout = IndexLayout::with_metadata(index_path, settings.metadata_path.clone());
    let metadata = MetadataStore::load(&layout.metadata_path).with_context(|| {
        format!("Failed to read metadata at {}", layout.metadata_path.display())
    })?;

    Ok(matches
        .into_iter()
        .map(|hit| {
            let meta = metadata.get(hit.executable_id, hit.address);
            QueryRow {
                hit,
                file_name: meta.map(|m| m.file_name.clone()),
                function_name: meta.map(|m| m.function_name.clone()),
                vulnerable: meta.is_some_and(|m| m.vulnerable),
            }
        })
        .collect())
}

pub fn query_command(
    index_path: &Path,
    graph_path: &Path,
    count: usize,
    settings: &SearchConfig,
    json: bool,
) -> Result<()> {
    let rows = query_rows(index_path, graph_path, count, settings)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if rows.is_empty() {
        println!("(no matches)");
        return Ok(());
    }
    for row in &rows {
        let hit = &row.hit;
        print!(
            "{:3}/128  sim {:.3}  odds {:.3e}  {:016x}:{:x}",
            hit.matching_bits, hit.similarity, hit.odds, hit.executable_id, hit.address
        );
        if let Some(name) = &row.function_name {
            print!("  {} ({})", name, row.file_name.as_deref().unwrap_or("?"));
        }
        if row.vulnerable {
            print!("  [vulnerable]");
        }
        println!();
    }
    Ok(())
}

/// Show capacity and occupancy of an index.
pub fn index_info_command(path: &Path, json: bool) -> Result<()> {
    let index = open_index(path)?;
    let stats = index.stats().context("Failed to read index stats")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }
    println!("Index: {}", path.display());
    println!("  Schema version: {}", stats.schema_version);
    println!("  Records: {}", stats.record_count);
    println!("  Permutations: {}", stats.permutations);
    println!("  Permuted entries: {}", stats.permuted_entry_count);
    println!("  Capacity: {} bytes", stats.capacity_bytes);
    println!("  Used: {} bytes", stats.used_bytes);
    println!("  Free: {} bytes", stats.free_bytes);
    Ok(())
}

/// Add capacity to an existing index.
pub fn grow_index_command(path: &Path, additional_bytes: u64) -> Result<()> {
    let mut index = open_index(path)?;
    let capacity = index.grow(additional_bytes).context("Failed to grow index")?;
    println!("Capacity: {} bytes", capacity);
    println!("Free: {} bytes", index.free_size());
    Ok(())
}

/// Print permuted-table entries (table 0 only unless `all`).
pub fn dump_index_command(path: &Path, all: bool, json: bool) -> Result<()> {
    let index = open_index(path)?;
    let entries = index.entries(all).context("Failed to read index entries")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    for entry in &entries {
        println!("{:3} {} {}", entry.permutation, entry.permuted, entry.record_id);
    }
    Ok(())
}
