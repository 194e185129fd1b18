use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{ErrorKind, Write as _};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::Address;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Metadata IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed metadata entry on line {line}: {content:?}")]
    Malformed { line: usize, content: String },

    /// The sidecar is line-based, so file names cannot span lines.
    #[error("File name contains a line break: {0:?}")]
    InvalidFileName(String),
}

pub type MetadataResult<T> = Result<T, MetadataError>;

/// Human-facing details about an indexed function.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionMetadata {
    pub file_name: String,
    pub function_name: String,
    /// Marks functions known to contain a vulnerability.
    pub vulnerable: bool,
}

impl FunctionMetadata {
    pub fn new(file_name: impl Into<String>, function_name: impl Into<String>) -> Self {
        Self { file_name: file_name.into(), function_name: function_name.into(), vulnerable: false }
    }

    pub fn with_vulnerable(mut self, vulnerable: bool) -> Self {
        self.vulnerable = vulnerable;
        self
    }
}

/// Sidecar text file mapping `(executable_id, address)` to function metadata.
///
/// One entry per line:
/// `<exec-id hex> <file name> <address hex> <base64 function name> <true|false>`.
/// Function names are base64-encoded because demangled names contain spaces.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    entries: BTreeMap<(u64, Address), FunctionMetadata>,
}

impl MetadataStore {
    /// Empty store bound to `path`; nothing is read until `load`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), entries: BTreeMap::new() }
    }

    /// Load the store from `path`. A missing file yields an empty store.
    pub fn load(path: impl Into<PathBuf>) -> MetadataResult<Self> {
        let mut store = Self::new(path);
        store.entries = read_entries(&store.path)?;
        debug!("loaded {} metadata entries from {}", store.entries.len(), store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or amend an entry. Returns the previous value, if any.
    pub fn insert(
        &mut self,
        executable_id: u64,
        address: Address,
        metadata: FunctionMetadata,
    ) -> MetadataResult<Option<FunctionMetadata>> {
        if metadata.file_name.contains(['\n', '\r']) {
            return Err(MetadataError::InvalidFileName(metadata.file_name));
        }
        Ok(self.entries.insert((executable_id, address), metadata))
    }

    pub fn get(&self, executable_id: u64, address: Address) -> Option<&FunctionMetadata> {
        self.entries.get(&(executable_id, address))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, Address, &FunctionMetadata)> + '_ {
        self.entries.iter().map(|((exec, addr), meta)| (*exec, *addr, meta))
    }

    /// Write the store back, merging with whatever is on disk now.
    ///
    /// Entries present on disk but not in memory are kept (and pulled into
    /// this store); entries in memory override the on-disk value for the
    /// same key. Nothing on disk is ever dropped.
    pub fn save(&mut self) -> MetadataResult<()> {
        let mut merged = read_entries(&self.path)?;
        merged.extend(self.entries.iter().map(|(key, meta)| (*key, meta.clone())));
        self.entries = merged;

        let mut out = String::new();
        for ((exec, addr), meta) in &self.entries {
            let _ = writeln!(out, "{}", format_line(*exec, *addr, meta));
        }
        write_replacing(&self.path, out.as_bytes())?;
        debug!("saved {} metadata entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}

/// Write through a sibling temp file and rename it over `path`, so a crash
/// leaves either the old or the new sidecar.
fn write_replacing(path: &Path, contents: &[u8]) -> MetadataResult<()> {
    let mut temp_name = OsString::from(path.as_os_str());
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = File::create(&temp_path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&temp_path, path)?;
    Ok(())
}

fn format_line(executable_id: u64, address: Address, meta: &FunctionMetadata) -> String {
    format!(
        "{executable_id:x} {} {address:x} {} {}",
        meta.file_name,
        STANDARD.encode(meta.function_name.as_bytes()),
        meta.vulnerable
    )
}

fn read_entries(path: &Path) -> MetadataResult<BTreeMap<(u64, Address), FunctionMetadata>> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(err) => return Err(err.into()),
    };
    let mut entries = BTreeMap::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let (key, meta) = parse_line(line).ok_or_else(|| MetadataError::Malformed {
            line: index + 1,
            content: raw.to_string(),
        })?;
        entries.insert(key, meta);
    }
    Ok(entries)
}

/// The file name sits between the first and the last three fields, so it
/// may itself contain spaces.
fn parse_line(line: &str) -> Option<((u64, Address), FunctionMetadata)> {
    let (exec, rest) = line.split_once(' ')?;
    let mut tail = rest.rsplitn(4, ' ');
    let vulnerable = tail.next()?;
    let encoded_name = tail.next()?;
    let address = tail.next()?;
    let file_name = tail.next()?;

    let exec = u64::from_str_radix(exec, 16).ok()?;
    let address = u64::from_str_radix(address, 16).ok()?;
    let vulnerable = match vulnerable {
        "true" => true,
        "false" => false,
        _ => return None,
    };
    let function_name = STANDARD
        .decode(encoded_name)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .unwrap_or_else(|| encoded_name.to_string());

    Some((
        (exec, address),
        FunctionMetadata { file_name: file_name.to_string(), function_name, vulnerable },
    ))
}
