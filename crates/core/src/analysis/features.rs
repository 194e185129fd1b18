use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use log::{trace, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{Address, Flowgraph};

const SEED0: u64 = 0xc3a5_c85c_97cb_3127;
const SEED1: u64 = 0xb492_b66f_be98_f273;
const SEED2: u64 = 0x9ae1_6a3b_2f90_404f;

pub const DEFAULT_GRAPHLET_DISTANCES: [u32; 3] = [1, 2, 3];
pub const DEFAULT_MAX_GRAPHLET_SIZE: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    /// Shape of the neighbourhood around one block.
    Graphlet,
    /// Three consecutive mnemonics.
    MnemonicTuple,
}

impl FeatureKind {
    /// Two-character tag used by weight files (`G.` / `M.`).
    pub fn tag(self) -> &'static str {
        match self {
            FeatureKind::Graphlet => "G",
            FeatureKind::MnemonicTuple => "M",
        }
    }

    fn key_prefix(self) -> u8 {
        self.tag().as_bytes()[0]
    }
}

/// 128-bit feature identity; rendered as 32 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(pub u128);

impl FeatureId {
    /// Derive the id from a raw feature key and its occurrence number.
    pub fn from_key(key: &[u8], occurrence: u32) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key);
        hasher.update(occurrence.to_be_bytes());
        Self(first_u128(&hasher.finalize()))
    }
}

pub(crate) fn first_u128(digest: &[u8]) -> u128 {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    u128::from_be_bytes(bytes)
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for FeatureId {
    type Err = String;

    /// Accepts `0123…ef` as well as the tagged form `G.0123…ef`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = match s.split_once('.') {
            Some((tag, rest)) if tag.len() == 2 || tag.len() == 1 => rest,
            Some(_) => return Err(format!("unexpected feature tag in {s:?}")),
            None => s,
        };
        if digits.len() != 32 {
            return Err(format!("feature id must be 32 hex digits, got {s:?}"));
        }
        u128::from_str_radix(digits, 16)
            .map(FeatureId)
            .map_err(|e| format!("invalid feature id {s:?}: {e}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Feature {
    pub kind: FeatureKind,
    pub id: FeatureId,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.kind.tag(), self.id)
    }
}

/// How repeated occurrences of the same feature key are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiplicity {
    /// The n-th repeat of a key gets its own id, so repeats add weight
    /// while every emitted id stays unique.
    #[default]
    OccurrenceTagged,
    /// Repeats are dropped; each key contributes once.
    Once,
}

/// Turns a flowgraph into its deterministic feature list.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    pub graphlet_distances: Vec<u32>,
    pub max_graphlet_size: usize,
    pub graphlets: bool,
    pub mnemonics: bool,
    pub multiplicity: Multiplicity,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self {
            graphlet_distances: DEFAULT_GRAPHLET_DISTANCES.to_vec(),
            max_graphlet_size: DEFAULT_MAX_GRAPHLET_SIZE,
            graphlets: true,
            mnemonics: true,
            multiplicity: Multiplicity::default(),
        }
    }
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mnemonics(mut self, enabled: bool) -> Self {
        self.mnemonics = enabled;
        self
    }

    pub fn with_multiplicity(mut self, multiplicity: Multiplicity) -> Self {
        self.multiplicity = multiplicity;
        self
    }

    /// Extract features: graphlets for each configured distance and node
    /// (ascending), then mnemonic 3-grams in block-address order.
    pub fn extract(&self, graph: &Flowgraph) -> Vec<Feature> {
        let mut keys: Vec<(FeatureKind, Vec<u8>)> = Vec::new();
        if self.graphlets {
            for &distance in &self.graphlet_distances {
                for node in graph.nodes() {
                    if let Some(key) = self.graphlet_key(graph, node, distance) {
                        keys.push((FeatureKind::Graphlet, key));
                    }
                }
            }
        }
        if self.mnemonics {
            let sequence: Vec<&str> = graph
                .blocks()
                .flat_map(|(_, insns)| insns.iter().map(|insn| insn.mnemonic.as_str()))
                .collect();
            for window in sequence.windows(3) {
                keys.push((FeatureKind::MnemonicTuple, mnemonic_key(window)));
            }
        }

        let mut seen: HashMap<Vec<u8>, u32> = HashMap::new();
        let mut features = Vec::with_capacity(keys.len());
        for (kind, key) in keys {
            let count = seen.entry(key.clone()).or_insert(0);
            let occurrence = *count;
            *count += 1;
            let occurrence = match self.multiplicity {
                Multiplicity::OccurrenceTagged => occurrence,
                Multiplicity::Once if occurrence > 0 => continue,
                Multiplicity::Once => 0,
            };
            features.push(Feature { kind, id: FeatureId::from_key(&key, occurrence) });
        }
        trace!("extracted {} features from {} nodes", features.len(), graph.node_count());
        features
    }

    fn graphlet_key(&self, graph: &Flowgraph, node: Address, distance: u32) -> Option<Vec<u8>> {
        let Some(subgraph) = graph.subgraph(node, distance, self.max_graphlet_size) else {
            warn!(
                "skipping graphlet at {node:#x} (distance {distance}): more than {} nodes",
                self.max_graphlet_size
            );
            return None;
        };
        let high = subgraph.structural_hash(node, SEED0, SEED1, SEED2);
        let low = subgraph.structural_hash(node, SEED1, SEED2, SEED0);
        let mut key = Vec::with_capacity(17);
        key.push(FeatureKind::Graphlet.key_prefix());
        key.extend_from_slice(&high.to_be_bytes());
        key.extend_from_slice(&low.to_be_bytes());
        Some(key)
    }
}

fn mnemonic_key(window: &[&str]) -> Vec<u8> {
    let mut key = vec![FeatureKind::MnemonicTuple.key_prefix()];
    for (i, mnemonic) in window.iter().enumerate() {
        if i > 0 {
            key.push(0);
        }
        key.extend_from_slice(mnemonic.as_bytes());
    }
    key
}
