use std::path::PathBuf;

use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::analysis::features::{
    first_u128, Feature, FeatureExtractor, FeatureId, FeatureKind, Multiplicity,
    DEFAULT_GRAPHLET_DISTANCES, DEFAULT_MAX_GRAPHLET_SIZE,
};
use crate::analysis::weights::{WeightTable, WeightsResult};
use crate::model::{Flowgraph, SimHash, HASH_BITS};

const PROJECTION_DOMAIN: &[u8] = b"simhash-projection";

/// Hasher settings as they appear in the search configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HasherConfig {
    pub weights_path: Option<PathBuf>,
    pub disable_graphlets: bool,
    pub disable_mnemonics: bool,
    pub default_graphlet_weight: f64,
    pub default_mnemonic_weight: f64,
    pub multiplicity: Multiplicity,
    pub graphlet_distances: Vec<u32>,
    pub max_graphlet_size: usize,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            weights_path: None,
            disable_graphlets: false,
            disable_mnemonics: false,
            default_graphlet_weight: 1.0,
            default_mnemonic_weight: 1.0,
            multiplicity: Multiplicity::default(),
            graphlet_distances: DEFAULT_GRAPHLET_DISTANCES.to_vec(),
            max_graphlet_size: DEFAULT_MAX_GRAPHLET_SIZE,
        }
    }
}

impl HasherConfig {
    pub fn extractor(&self) -> FeatureExtractor {
        FeatureExtractor {
            graphlet_distances: self.graphlet_distances.clone(),
            max_graphlet_size: self.max_graphlet_size,
            graphlets: !self.disable_graphlets,
            mnemonics: !self.disable_mnemonics,
            multiplicity: self.multiplicity,
        }
    }
}

/// Weighted SimHash over flowgraph features.
///
/// Each feature votes on all 128 bit positions using a pseudo-random
/// projection of its id: `+weight` where the projection bit is set and
/// `-weight` otherwise. A hash bit is set only when its vote total is
/// strictly positive, so a zero total (no features, or all weights zero)
/// yields a cleared bit.
#[derive(Debug, Clone)]
pub struct SimHasher {
    extractor: FeatureExtractor,
    weights: WeightTable,
    default_graphlet_weight: f64,
    default_mnemonic_weight: f64,
}

impl Default for SimHasher {
    fn default() -> Self {
        Self::with_config(&HasherConfig::default())
    }
}

impl SimHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a hasher from config without touching the filesystem; any
    /// `weights_path` is ignored (see `from_config`).
    pub fn with_config(config: &HasherConfig) -> Self {
        Self {
            extractor: config.extractor(),
            weights: WeightTable::new(),
            default_graphlet_weight: config.default_graphlet_weight,
            default_mnemonic_weight: config.default_mnemonic_weight,
        }
    }

    /// Build a hasher from config, loading the weight table if one is named.
    pub fn from_config(config: &HasherConfig) -> WeightsResult<Self> {
        let mut hasher = Self::with_config(config);
        if let Some(path) = &config.weights_path {
            hasher.weights = WeightTable::load(path)?;
        }
        Ok(hasher)
    }

    pub fn with_weights(mut self, weights: WeightTable) -> Self {
        self.weights = weights;
        self
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn weights(&self) -> &WeightTable {
        &self.weights
    }

    pub fn calculate(&self, graph: &Flowgraph) -> SimHash {
        self.calculate_with_features(graph).0
    }

    /// Hash a graph and return the features that went into it.
    pub fn calculate_with_features(&self, graph: &Flowgraph) -> (SimHash, Vec<Feature>) {
        let features = self.extractor.extract(graph);
        let hash = self.calculate_from_features(&features);
        debug!("hashed graph of {} nodes / {} features to {hash}", graph.node_count(), features.len());
        (hash, features)
    }

    pub fn calculate_from_features(&self, features: &[Feature]) -> SimHash {
        let votes = self.accumulate(features);
        let mut value = 0u128;
        for (bit, vote) in votes.iter().enumerate() {
            if *vote > 0.0 {
                value |= 1u128 << bit;
            }
        }
        SimHash::from_u128(value)
    }

    /// Raw per-bit vote totals; index `i` corresponds to bit `i` of the
    /// 128-bit hash value (bit 0 is the least significant bit of `h2`).
    pub fn accumulate(&self, features: &[Feature]) -> [f64; HASH_BITS as usize] {
        let mut votes = [0.0f64; HASH_BITS as usize];
        for feature in features {
            let weight = self.weight_of(feature);
            let projection = projection(feature.id);
            for (bit, vote) in votes.iter_mut().enumerate() {
                if (projection >> bit) & 1 == 1 {
                    *vote += weight;
                } else {
                    *vote -= weight;
                }
            }
        }
        votes
    }

    pub fn weight_of(&self, feature: &Feature) -> f64 {
        self.weights.get(feature.id).unwrap_or(match feature.kind {
            FeatureKind::Graphlet => self.default_graphlet_weight,
            FeatureKind::MnemonicTuple => self.default_mnemonic_weight,
        })
    }
}

/// Pseudo-random 128-bit projection of a feature id.
pub fn projection(id: FeatureId) -> u128 {
    let mut hasher = Sha256::new();
    hasher.update(PROJECTION_DOMAIN);
    hasher.update(id.0.to_be_bytes());
    first_u128(&hasher.finalize())
}
