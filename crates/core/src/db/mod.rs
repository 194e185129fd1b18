//! Persistent storage.
//!
//! - `search_index`: SQLite-backed permutation index over similarity hashes.
//! - `permutation`: the fixed 128-bit bit permutation the index relies on.
//! - `metadata`: text sidecar mapping indexed functions to names and files.
//! - `config` / `layout`: search configuration and derived on-disk paths.

pub mod config;
pub mod layout;
pub mod metadata;
pub mod models;
pub mod permutation;
pub mod search_index;

pub use config::{
    load_search_config, SearchConfig, DEFAULT_LOW_SPACE_THRESHOLD, DEFAULT_MIN_BRANCHING_NODES,
};
pub use layout::IndexLayout;
pub use metadata::{FunctionMetadata, MetadataError, MetadataResult, MetadataStore};
pub use models::{IndexEntry, IndexRecord, IndexStats, QueryHit};
pub use search_index::{
    IndexError, IndexOptions, IndexResult, SearchIndex, APPLICATION_ID, CURRENT_SCHEMA_VERSION,
    DEFAULT_CAPACITY_BITS, DEFAULT_PERMUTATIONS,
};
