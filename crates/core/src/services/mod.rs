//! Higher-level workflows built on the hasher and the index.

pub mod search;

pub use search::{executable_id_for_file, IndexOutcome, ScoredMatch, SearchService};
