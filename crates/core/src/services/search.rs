use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analysis::{odds_of_random_hit, similarity, SimHasher};
use crate::db::{
    IndexError, IndexResult, QueryHit, SearchConfig, SearchIndex, DEFAULT_LOW_SPACE_THRESHOLD,
    DEFAULT_MIN_BRANCHING_NODES,
};
use crate::model::{Address, Flowgraph, SimHash};

/// What happened when a function was offered to the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOutcome {
    Indexed(SimHash),
    /// The graph is too simple to produce a useful hash; nothing was stored.
    BelowThreshold { branching_nodes: usize },
}

/// A query hit annotated with similarity and chance-match odds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    pub matching_bits: u32,
    pub executable_id: u64,
    pub address: Address,
    pub hash: SimHash,
    /// `matching_bits / 128`.
    pub similarity: f64,
    /// Unrelated hits expected per genuine one at this score; larger is better.
    pub odds: f64,
}

impl ScoredMatch {
    fn from_hit(hit: QueryHit, population: u64) -> Self {
        Self {
            matching_bits: hit.matching_bits,
            executable_id: hit.executable_id,
            address: hit.address,
            hash: hit.hash,
            similarity: similarity(hit.matching_bits),
            odds: odds_of_random_hit(hit.matching_bits, population),
        }
    }
}

/// Hasher plus index plus the policy callers apply around them: skip
/// trivially small functions, stop before the index runs out of space.
#[derive(Debug)]
pub struct SearchService {
    hasher: SimHasher,
    index: SearchIndex,
    min_branching_nodes: usize,
    low_space_threshold: u64,
}

impl SearchService {
    pub fn new(hasher: SimHasher, index: SearchIndex) -> Self {
        Self {
            hasher,
            index,
            min_branching_nodes: DEFAULT_MIN_BRANCHING_NODES,
            low_space_threshold: DEFAULT_LOW_SPACE_THRESHOLD,
        }
    }

    /// Load weights and open (or create) the configured index.
    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        let hasher = SimHasher::from_config(&config.hasher).context("Failed to load feature weights")?;
        let index = SearchIndex::open_or_create(&config.index_path, config.index_options())
            .with_context(|| format!("Failed to open index at {}", config.index_path.display()))?;
        Ok(Self::new(hasher, index)
            .with_min_branching_nodes(config.min_branching_nodes)
            .with_low_space_threshold(config.low_space_threshold))
    }

    pub fn with_min_branching_nodes(mut self, min_branching_nodes: usize) -> Self {
        self.min_branching_nodes = min_branching_nodes;
        self
    }

    pub fn with_low_space_threshold(mut self, low_space_threshold: u64) -> Self {
        self.low_space_threshold = low_space_threshold;
        self
    }

    pub fn hasher(&self) -> &SimHasher {
        &self.hasher
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    /// Hash `graph` and store it, unless it is below the branching-node gate.
    ///
    /// Refuses with `CapacityExhausted` once free space drops below the
    /// low-space threshold, leaving room for the caller to grow the index.
    pub fn index_function(
        &self,
        graph: &Flowgraph,
        executable_id: u64,
        address: Address,
    ) -> IndexResult<IndexOutcome> {
        let branching_nodes = graph.number_of_branching_nodes();
        if branching_nodes < self.min_branching_nodes {
            debug!(
                "skipping {executable_id:x}:{address:x}: {branching_nodes} branching nodes < {}",
                self.min_branching_nodes
            );
            return Ok(IndexOutcome::BelowThreshold { branching_nodes });
        }

        let free = self.index.free_size();
        let required = self.low_space_threshold.max(self.index.bytes_per_record());
        if free < required {
            warn!("index {} is low on space: {free} bytes free", self.index.path().display());
            return Err(IndexError::CapacityExhausted { free, required });
        }

        let hash = self.hasher.calculate(graph);
        self.index.add_function(hash, executable_id, address)?;
        Ok(IndexOutcome::Indexed(hash))
    }

    /// Top `n` matches for `graph`, best first.
    pub fn search(&self, graph: &Flowgraph, n: usize) -> IndexResult<Vec<ScoredMatch>> {
        self.search_hash(self.hasher.calculate(graph), n)
    }

    pub fn search_hash(&self, hash: SimHash, n: usize) -> IndexResult<Vec<ScoredMatch>> {
        let population = self.index.record_count();
        let hits = self.index.query_top_n(hash, n)?;
        Ok(hits.into_iter().map(|hit| ScoredMatch::from_hit(hit, population)).collect())
    }
}

/// Identify a binary by content: the first 8 bytes (big-endian) of its SHA-256.
pub fn executable_id_for_file(path: &Path) -> io::Result<u64> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Ok(u64::from_be_bytes(bytes))
}
