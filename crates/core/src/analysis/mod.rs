//! Hash computation.
//!
//! - `features`: flowgraph to a deterministic list of 128-bit feature ids
//! - `weights`: optional learned per-feature weights
//! - `simhash`: weighted SimHash over the features
//! - `confidence`: chance-match statistics for ranking query results

pub mod confidence;
pub mod features;
pub mod simhash;
pub mod weights;

pub use confidence::{
    normalized_similarity, odds_of_random_hit, probability_of_random_match, similarity,
};
pub use features::{Feature, FeatureExtractor, FeatureId, FeatureKind, Multiplicity};
pub use simhash::{projection, HasherConfig, SimHasher};
pub use weights::{WeightTable, WeightsError, WeightsResult};
