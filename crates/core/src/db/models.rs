use serde::{Deserialize, Serialize};

use crate::model::{Address, SimHash};

/// One function stored in the search index.
///
/// Records are append-only; the index never rewrites or deletes them.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexRecord {
    pub hash: SimHash,
    /// Identifies the binary the function came from (see `executable_id_for_file`).
    pub executable_id: u64,
    pub address: Address,
}

impl IndexRecord {
    pub fn new(hash: SimHash, executable_id: u64, address: Address) -> Self {
        Self { hash, executable_id, address }
    }
}

/// A query result: a stored record plus how many bits it shares with the query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryHit {
    /// 0..=128; an identical hash scores 128.
    pub matching_bits: u32,
    pub executable_id: u64,
    pub address: Address,
    pub hash: SimHash,
    /// Insertion sequence number; lower ids were inserted earlier.
    pub record_id: i64,
}

/// One row of a permutation table, as exposed by `SearchIndex::entries`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexEntry {
    pub permutation: u32,
    pub permuted: SimHash,
    pub record_id: i64,
}

/// Size and occupancy summary of an index file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexStats {
    pub schema_version: i32,
    pub permutations: u32,
    pub record_count: u64,
    pub permuted_entry_count: u64,
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// Bytes one additional record consumes.
    pub bytes_per_record: u64,
}
