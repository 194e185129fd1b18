use std::cell::Cell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;

use crate::analysis::confidence;
use crate::db::models::{IndexEntry, IndexRecord, IndexStats, QueryHit};
use crate::db::permutation;
use crate::model::{SimHash, HASH_BITS};

/// Value of `PRAGMA application_id` marking a function search index ("FSSI").
pub const APPLICATION_ID: i32 = 0x4653_5349;

/// Oldest schema version `open` accepts. Version 0 means "no schema", which
/// for an existing file signals that it was never initialised as an index.
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 1;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

pub const DEFAULT_CAPACITY_BITS: u32 = 28;
pub const MIN_CAPACITY_BITS: u32 = 10;
pub const MAX_CAPACITY_BITS: u32 = 62;

pub const DEFAULT_PERMUTATIONS: u32 = 28;
pub const MAX_PERMUTATIONS: u32 = 128;

/// Leading bits of a permuted hash that must agree for a stored entry to
/// become a query candidate.
const PREFIX_BITS: u32 = 8;

/// Accounted size of a record: hash, executable id and address.
const RECORD_BYTES: u64 = 32;

/// Accounted size of one permuted-table entry: permuted hash, record id and
/// permutation number.
const PERMUTED_ENTRY_BYTES: u64 = 25;

const SIGN_BIT: u64 = 1 << 63;

/// Error type for search index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying SQLite error (including "file is not a database").
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Index file does not exist: {}", .0.display())]
    Missing(PathBuf),

    #[error("Refusing to create index, file already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The file is a SQLite database, but not one of ours.
    #[error("Not a search index (application id {found:#x})")]
    ForeignFormat { found: i32 },

    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },

    #[error("Corrupt index header: {0}")]
    CorruptHeader(String),

    #[error("Invalid capacity of {0} bits; expected {MIN_CAPACITY_BITS}..={MAX_CAPACITY_BITS}")]
    InvalidCapacity(u32),

    #[error("Invalid permutation count {0}; expected 1..={MAX_PERMUTATIONS}")]
    InvalidPermutationCount(u32),

    /// Inserting would exceed the provisioned capacity. Nothing was written.
    #[error("Index capacity exhausted: {free} bytes free, {required} required")]
    CapacityExhausted { free: u64, required: u64 },
}

/// Convenience result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Creation-time parameters. Ignored when opening an existing index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexOptions {
    /// Capacity is `2^capacity_bits` bytes.
    pub capacity_bits: u32,
    /// Number of permuted tables kept per record.
    pub permutations: u32,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self { capacity_bits: DEFAULT_CAPACITY_BITS, permutations: DEFAULT_PERMUTATIONS }
    }
}

impl IndexOptions {
    pub fn new(capacity_bits: u32) -> Self {
        Self { capacity_bits, ..Self::default() }
    }

    pub fn with_permutations(mut self, permutations: u32) -> Self {
        self.permutations = permutations;
        self
    }

    pub fn validate(&self) -> IndexResult<()> {
        if !(MIN_CAPACITY_BITS..=MAX_CAPACITY_BITS).contains(&self.capacity_bits) {
            return Err(IndexError::InvalidCapacity(self.capacity_bits));
        }
        if !(1..=MAX_PERMUTATIONS).contains(&self.permutations) {
            return Err(IndexError::InvalidPermutationCount(self.permutations));
        }
        Ok(())
    }

    pub fn capacity_bytes(&self) -> u64 {
        1u64 << self.capacity_bits
    }
}

/// Persistent nearest-neighbour index over 128-bit similarity hashes.
///
/// Every record is stored once, plus once per permutation in a table keyed
/// by the permuted hash. A query permutes its hash the same way and reads
/// the entries sharing the leading `PREFIX_BITS` bits in each table; hashes
/// that differ in few bits are very likely to agree on that prefix in at
/// least one permutation. Candidates are then ranked by exact bit agreement.
///
/// Single writer: concurrent writers on the same file must be serialized by
/// the caller.
#[derive(Debug)]
pub struct SearchIndex {
    conn: Connection,
    path: PathBuf,
    capacity_bytes: u64,
    permutations: u32,
    /// Mirrors `index_meta.record_count`; updated only after a commit.
    record_count: Cell<u64>,
}

impl SearchIndex {
    /// Create a fresh index. Fails if anything already exists at `path`.
    pub fn create(path: &Path, options: IndexOptions) -> IndexResult<Self> {
        options.validate()?;
        if path.exists() {
            return Err(IndexError::AlreadyExists(path.to_path_buf()));
        }
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;

        let capacity_bytes = options.capacity_bytes();
        let tx = conn.unchecked_transaction()?;
        write_meta(&tx, "capacity_bytes", capacity_bytes)?;
        write_meta(&tx, "permutations", u64::from(options.permutations))?;
        tx.commit()?;

        info!(
            "created index {} ({} bytes, {} permutations)",
            path.display(),
            capacity_bytes,
            options.permutations
        );
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            capacity_bytes,
            permutations: options.permutations,
            record_count: Cell::new(0),
        })
    }

    /// Open an existing index; its recorded capacity and permutation count win.
    pub fn open(path: &Path) -> IndexResult<Self> {
        if !path.exists() {
            return Err(IndexError::Missing(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let application_id: i32 = conn.query_row("PRAGMA application_id;", [], |row| row.get(0))?;
        if application_id != APPLICATION_ID {
            return Err(IndexError::ForeignFormat { found: application_id });
        }

        let version = current_schema_version(&conn)?;
        if !(MIN_SUPPORTED_SCHEMA_VERSION..=CURRENT_SCHEMA_VERSION).contains(&version) {
            return Err(IndexError::UnsupportedSchemaVersion {
                found: version,
                min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
                max_supported: CURRENT_SCHEMA_VERSION,
            });
        }
        apply_migrations(&conn)?;

        let capacity_bytes = read_meta(&conn, "capacity_bytes")?;
        let permutations = read_meta(&conn, "permutations")?;
        let permutations = u32::try_from(permutations)
            .ok()
            .filter(|k| (1..=MAX_PERMUTATIONS).contains(k))
            .ok_or_else(|| {
                IndexError::CorruptHeader(format!("permutation count {permutations} out of range"))
            })?;

        let record_count = read_meta(&conn, "record_count")?;

        debug!(
            "opened index {} ({} bytes, {} permutations, {} records)",
            path.display(),
            capacity_bytes,
            permutations,
            record_count
        );
        Ok(Self {
            conn,
            path: path.to_path_buf(),
            capacity_bytes,
            permutations,
            record_count: Cell::new(record_count),
        })
    }

    /// `create = true` creates a fresh index (error if the file exists);
    /// `create = false` opens an existing one (error if it does not).
    pub fn create_or_open(path: &Path, create: bool, options: IndexOptions) -> IndexResult<Self> {
        if create {
            Self::create(path, options)
        } else {
            Self::open(path)
        }
    }

    /// Open the index if the file exists, otherwise create it.
    pub fn open_or_create(path: &Path, options: IndexOptions) -> IndexResult<Self> {
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path, options)
        }
    }

    /// Expose a reference to the underlying connection for advanced callers.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn permutations(&self) -> u32 {
        self.permutations
    }

    pub fn capacity_bytes(&self) -> u64 {
        self.capacity_bytes
    }

    /// Capacity consumed by each inserted record.
    pub fn bytes_per_record(&self) -> u64 {
        RECORD_BYTES + PERMUTED_ENTRY_BYTES * u64::from(self.permutations)
    }

    /// Number of stored records, kept in the header rather than counted.
    pub fn record_count(&self) -> u64 {
        self.record_count.get()
    }

    pub fn permuted_entry_count(&self) -> IndexResult<u64> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM permuted_hashes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn used_bytes(&self) -> u64 {
        self.record_count().saturating_mul(self.bytes_per_record())
    }

    /// Remaining capacity in bytes.
    pub fn free_size(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes())
    }

    /// [`confidence::odds_of_random_hit`] against this index's population.
    pub fn odds_of_random_hit(&self, matching_bits: u32) -> f64 {
        confidence::odds_of_random_hit(matching_bits, self.record_count())
    }

    /// Append one record and return its id.
    pub fn add_function(
        &self,
        hash: SimHash,
        executable_id: u64,
        address: u64,
    ) -> IndexResult<i64> {
        let ids = self.add_functions(&[IndexRecord::new(hash, executable_id, address)])?;
        Ok(ids[0])
    }

    /// Append a batch of records in one transaction.
    ///
    /// Either every record is stored or, if the batch does not fit in the
    /// remaining capacity, none is.
    pub fn add_functions(&self, records: &[IndexRecord]) -> IndexResult<Vec<i64>> {
        let required = (records.len() as u64).saturating_mul(self.bytes_per_record());
        let free = self.free_size();
        if required > free {
            return Err(IndexError::CapacityExhausted { free, required });
        }

        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(records.len());
        {
            let mut insert_record = tx.prepare(
                r#"
                INSERT INTO records (hash_hi, hash_lo, executable_id, address)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;
            let mut insert_permuted = tx.prepare(
                r#"
                INSERT INTO permuted_hashes (permutation, hash_hi, hash_lo, record_id)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )?;
            for record in records {
                insert_record.execute(params![
                    record.hash.h1 as i64,
                    record.hash.h2 as i64,
                    record.executable_id as i64,
                    record.address as i64
                ])?;
                let id = tx.last_insert_rowid();
                let permuted =
                    permutation::permutations(record.hash.as_u128(), self.permutations as usize);
                for (k, value) in permuted.into_iter().enumerate() {
                    let value = SimHash::from_u128(value);
                    insert_permuted.execute(params![
                        k as i64,
                        sortable(value.h1),
                        sortable(value.h2),
                        id
                    ])?;
                }
                ids.push(id);
            }
        }
        let record_count = self.record_count() + ids.len() as u64;
        write_meta(&tx, "record_count", record_count)?;
        tx.commit()?;
        self.record_count.set(record_count);

        debug!("inserted {} record(s) into {}", ids.len(), self.path.display());
        Ok(ids)
    }

    /// Up to `n` stored records most similar to `hash`, best first.
    ///
    /// Ordering is by descending matching bits, then ascending record id
    /// (earlier insertions first).
    pub fn query_top_n(&self, hash: SimHash, n: usize) -> IndexResult<Vec<QueryHit>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let query_permuted = permutation::permutations(hash.as_u128(), self.permutations as usize);
        let low_mask = u64::MAX >> PREFIX_BITS;

        let mut best: HashMap<i64, u32> = HashMap::new();
        {
            let mut stmt = self.conn.prepare_cached(
                r#"
                SELECT hash_hi, hash_lo, record_id
                FROM permuted_hashes
                WHERE permutation = ?1 AND hash_hi BETWEEN ?2 AND ?3
                "#,
            )?;
            for (k, query_value) in query_permuted.iter().enumerate() {
                let query_hi = (query_value >> 64) as u64;
                let bucket_start = query_hi & !low_mask;
                let bucket_end = bucket_start | low_mask;
                let rows = stmt.query_map(
                    params![k as i64, sortable(bucket_start), sortable(bucket_end)],
                    |row| {
                        let hi: i64 = row.get(0)?;
                        let lo: i64 = row.get(1)?;
                        let id: i64 = row.get(2)?;
                        Ok((SimHash::new(unsortable(hi), unsortable(lo)), id))
                    },
                )?;
                for row in rows {
                    let (stored, id) = row?;
                    let matching = HASH_BITS - (stored.as_u128() ^ query_value).count_ones();
                    let slot = best.entry(id).or_insert(matching);
                    *slot = (*slot).max(matching);
                }
            }
        }

        let candidates = best.len();
        let mut ranked: Vec<(i64, u32)> = best.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked.truncate(n);

        let mut hits = Vec::with_capacity(ranked.len());
        for (id, matching_bits) in ranked {
            let record = self.record(id)?.ok_or_else(|| {
                IndexError::CorruptHeader(format!("permuted entry references missing record {id}"))
            })?;
            hits.push(QueryHit {
                matching_bits,
                executable_id: record.executable_id,
                address: record.address,
                hash: record.hash,
                record_id: id,
            });
        }
        debug!("query {hash}: {candidates} candidate(s), returning {}", hits.len());
        Ok(hits)
    }

    /// Fetch one record by id.
    pub fn record(&self, id: i64) -> IndexResult<Option<IndexRecord>> {
        let record = self
            .conn
            .query_row(
                r#"
                SELECT hash_hi, hash_lo, executable_id, address
                FROM records
                WHERE id = ?1
                "#,
                params![id],
                map_record,
            )
            .optional()?;
        Ok(record)
    }

    /// All records in insertion order, with their ids.
    pub fn records(&self) -> IndexResult<Vec<(i64, IndexRecord)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT hash_hi, hash_lo, executable_id, address, id
            FROM records
            ORDER BY id
            "#,
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(4)?, map_record(row)?)))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Dump permuted-table entries in sorted order: only table 0 unless
    /// `all` is set.
    pub fn entries(&self, all: bool) -> IndexResult<Vec<IndexEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT permutation, hash_hi, hash_lo, record_id
            FROM permuted_hashes
            WHERE ?1 OR permutation = 0
            ORDER BY permutation, hash_hi, hash_lo, record_id
            "#,
        )?;
        let rows = stmt.query_map(params![all], |row| {
            let permutation: i64 = row.get(0)?;
            let hi: i64 = row.get(1)?;
            let lo: i64 = row.get(2)?;
            Ok(IndexEntry {
                permutation: permutation as u32,
                permuted: SimHash::new(unsortable(hi), unsortable(lo)),
                record_id: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Add `additional_bytes` of capacity. Returns the new capacity.
    ///
    /// Capacity is never expanded implicitly; callers watching `free_size`
    /// decide when to call this.
    pub fn grow(&mut self, additional_bytes: u64) -> IndexResult<u64> {
        let capacity = self.capacity_bytes.saturating_add(additional_bytes).min(i64::MAX as u64);
        write_meta(&self.conn, "capacity_bytes", capacity)?;
        info!(
            "grew index {} from {} to {} bytes",
            self.path.display(),
            self.capacity_bytes,
            capacity
        );
        self.capacity_bytes = capacity;
        Ok(capacity)
    }

    pub fn stats(&self) -> IndexResult<IndexStats> {
        let record_count = self.record_count();
        let used_bytes = self.used_bytes();
        Ok(IndexStats {
            schema_version: current_schema_version(&self.conn)?,
            permutations: self.permutations,
            record_count,
            permuted_entry_count: self.permuted_entry_count()?,
            capacity_bytes: self.capacity_bytes,
            used_bytes,
            free_bytes: self.capacity_bytes.saturating_sub(used_bytes),
            bytes_per_record: self.bytes_per_record(),
        })
    }
}

fn map_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<IndexRecord> {
    let hi: i64 = row.get(0)?;
    let lo: i64 = row.get(1)?;
    let executable_id: i64 = row.get(2)?;
    let address: i64 = row.get(3)?;
    Ok(IndexRecord {
        hash: SimHash::new(hi as u64, lo as u64),
        executable_id: executable_id as u64,
        address: address as u64,
    })
}

/// Map an unsigned value into SQLite's signed integer space preserving order.
fn sortable(value: u64) -> i64 {
    (value ^ SIGN_BIT) as i64
}

fn unsortable(value: i64) -> u64 {
    (value as u64) ^ SIGN_BIT
}

fn write_meta(conn: &Connection, key: &str, value: u64) -> IndexResult<()> {
    conn.execute(
        r#"
        INSERT INTO index_meta (key, value) VALUES (?1, ?2)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value
        "#,
        params![key, value as i64],
    )?;
    Ok(())
}

fn read_meta(conn: &Connection, key: &str) -> IndexResult<u64> {
    let value: Option<i64> = conn
        .query_row("SELECT value FROM index_meta WHERE key = ?1", params![key], |row| row.get(0))
        .optional()?;
    match value {
        Some(value) if value >= 0 => Ok(value as u64),
        Some(value) => Err(IndexError::CorruptHeader(format!("negative {key}: {value}"))),
        None => Err(IndexError::CorruptHeader(format!("missing {key}"))),
    }
}

/// Apply schema migrations to bring a fresh index to the latest version.
///
/// Version map:
/// - 0: no schema
/// - 1: index_meta, records, permuted_hashes
/// - 2: record_count kept in index_meta
fn apply_migrations(conn: &Connection) -> IndexResult<()> {
    let current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(IndexError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(&format!(
            r#"
            BEGIN;
            PRAGMA application_id = {APPLICATION_ID};

            CREATE TABLE IF NOT EXISTS index_meta (
                key   TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS records (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                hash_hi       INTEGER NOT NULL,
                hash_lo       INTEGER NOT NULL,
                executable_id INTEGER NOT NULL,
                address       INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS permuted_hashes (
                permutation INTEGER NOT NULL,
                hash_hi     INTEGER NOT NULL,
                hash_lo     INTEGER NOT NULL,
                record_id   INTEGER NOT NULL REFERENCES records(id),
                PRIMARY KEY (permutation, hash_hi, hash_lo, record_id)
            ) WITHOUT ROWID;

            PRAGMA user_version = 1;
            COMMIT;
            "#
        ))?;
    }

    if current_version < 2 {
        conn.execute_batch(
            r#"
            BEGIN;
            INSERT OR REPLACE INTO index_meta (key, value)
            SELECT 'record_count', COUNT(*) FROM records;
            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

/// Read the SQLite schema version from `PRAGMA user_version`.
fn current_schema_version(conn: &Connection) -> IndexResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
