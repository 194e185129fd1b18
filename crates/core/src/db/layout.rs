use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Files that make up one search index on disk.
///
/// Derived from the index path only. It does *not* perform any IO itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexLayout {
    /// The SQLite index file.
    pub index_path: PathBuf,
    /// Metadata sidecar (function names, source files).
    pub metadata_path: PathBuf,
}

impl IndexLayout {
    /// Default layout: metadata lives next to the index as `<index>.meta`.
    pub fn new(index_path: impl AsRef<Path>) -> Self {
        Self::with_metadata(index_path, None)
    }

    pub fn with_metadata(index_path: impl AsRef<Path>, metadata_path: Option<PathBuf>) -> Self {
        let index_path = index_path.as_ref().to_path_buf();
        let metadata_path = metadata_path.unwrap_or_else(|| {
            let mut name = OsString::from(index_path.as_os_str());
            name.push(".meta");
            PathBuf::from(name)
        });
        Self { index_path, metadata_path }
    }
}
