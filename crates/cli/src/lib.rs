use std::path::Path;

use anyhow::{Context, Result};
use log::LevelFilter;
use simsearch_core::db::{load_search_config, SearchConfig};
use simsearch_core::model::Flowgraph;

pub mod commands;

/// Install the stderr logger. `verbosity` is the number of `-v` flags.
pub fn init_logging(verbosity: u8) -> Result<()> {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{:5}] {} {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr())
        .apply()
        .context("Failed to initialize logging")?;
    Ok(())
}

/// Parse an integer given as `0x`-prefixed hex or decimal.
pub fn parse_u64(text: &str) -> Result<u64, String> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid number {text:?}: {e}"))
}

/// Load a flowgraph from its JSON exchange file.
pub fn load_flowgraph(path: &Path) -> Result<Flowgraph> {
    Flowgraph::from_json_file(path)
        .with_context(|| format!("Failed to read flowgraph from {}", path.display()))
}

/// The search config from `--config`, or defaults when none was given.
pub fn load_settings(config: Option<&Path>) -> Result<SearchConfig> {
    match config {
        Some(path) => load_search_config(path),
        None => Ok(SearchConfig::default()),
    }
}

/// Entry address for a graph: the explicit one if given, else its lowest block.
pub fn entry_address(graph: &Flowgraph, explicit: Option<u64>) -> Option<u64> {
    explicit.or_else(|| graph.nodes().next())
}
