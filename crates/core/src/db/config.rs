use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::analysis::HasherConfig;
use crate::db::search_index::{IndexOptions, DEFAULT_CAPACITY_BITS, DEFAULT_PERMUTATIONS};
use crate::db::IndexLayout;

/// Functions with fewer branching nodes than this are not indexed by default.
pub const DEFAULT_MIN_BRANCHING_NODES: usize = 5;

/// Free-space level (bytes) below which indexing stops.
pub const DEFAULT_LOW_SPACE_THRESHOLD: u64 = 1024;

/// Serializable search configuration, loaded from JSON or YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub index_path: PathBuf,
    /// Metadata sidecar; defaults to `<index_path>.meta`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata_path: Option<PathBuf>,
    pub capacity_bits: u32,
    pub permutations: u32,
    pub min_branching_nodes: usize,
    pub low_space_threshold: u64,
    pub hasher: HasherConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: PathBuf::from("functions.simidx"),
            metadata_path: None,
            capacity_bits: DEFAULT_CAPACITY_BITS,
            permutations: DEFAULT_PERMUTATIONS,
            min_branching_nodes: DEFAULT_MIN_BRANCHING_NODES,
            low_space_threshold: DEFAULT_LOW_SPACE_THRESHOLD,
            hasher: HasherConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self { index_path: index_path.into(), ..Self::default() }
    }

    pub fn index_options(&self) -> IndexOptions {
        IndexOptions { capacity_bits: self.capacity_bits, permutations: self.permutations }
    }

    pub fn layout(&self) -> IndexLayout {
        IndexLayout::with_metadata(&self.index_path, self.metadata_path.clone())
    }
}

/// Load a search config, choosing YAML for `.yaml`/`.yml` files and JSON
/// otherwise. Missing fields take their defaults.
pub fn load_search_config(path: &Path) -> Result<SearchConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read search config at {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let config = if is_yaml {
        serde_yaml::from_str(&text).context("Failed to parse search config YAML")?
    } else {
        serde_json::from_str(&text).context("Failed to parse search config JSON")?
    };
    Ok(config)
}
