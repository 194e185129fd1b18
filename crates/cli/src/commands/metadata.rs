use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use simsearch_core::db::{FunctionMetadata, IndexLayout, MetadataStore};
use simsearch_core::services::executable_id_for_file;

/// Identifier of an executable: the first 8 bytes of its SHA-256, big-endian.
pub fn exec_id(path: &Path) -> Result<u64> {
    executable_id_for_file(path).with_context(|| format!("Failed to hash {}", path.display()))
}

pub fn exec_id_command(path: &Path) -> Result<()> {
    println!("{:016x}  {}", exec_id(path)?, path.display());
    Ok(())
}

/// Record names for an indexed function in the metadata sidecar of `index_path`.
pub fn annotate(
    index_path: &Path,
    metadata_path: Option<PathBuf>,
    executable_id: u64,
    address: u64,
    metadata: FunctionMetadata,
) -> Result<PathBuf> {
    let layout = IndexLayout::with_metadata(index_path, metadata_path);
    let mut store = MetadataStore::load(&layout.metadata_path).with_context(|| {
        format!("Failed to read metadata at {}", layout.metadata_path.display())
    })?;
    store
        .insert(executable_id, address, metadata)
        .context("Refusing to annotate function")?;
    store.save().with_context(|| {
        format!("Failed to write metadata at {}", layout.metadata_path.display())
    })?;
    Ok(layout.metadata_path)
}

pub fn annotate_command(
    index_path: &Path,
    metadata_path: Option<PathBuf>,
    executable_id: u64,
    address: u64,
    metadata: FunctionMetadata,
) -> Result<()> {
    let name = metadata.function_name.clone();
    let written = annotate(index_path, metadata_path, executable_id, address, metadata)?;
    println!("Annotated {executable_id:016x}:{address:x} as {name} in {}", written.display());
    Ok(())
}
