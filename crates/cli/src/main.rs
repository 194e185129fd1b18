use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use simsearch::commands::*;
use simsearch::{init_logging, load_settings, parse_u64};
use simsearch_core::analysis::Multiplicity;
use simsearch_core::db::{FunctionMetadata, IndexOptions, SearchConfig};

/// Search indexed functions for ones structurally similar to a given flowgraph.
///
/// Flowgraphs are read from the JSON exchange format; every substantive step
/// lives in `simsearch-core` so it can be reused from other frontends.
#[derive(Parser, Debug)]
#[command(name = "simsearch", version, about = "SimHash function similarity search", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Search config (JSON, or YAML by extension).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Overrides for the hasher part of the config.
#[derive(Args, Debug, Default)]
struct HasherArgs {
    /// Learned feature weight file.
    #[arg(long)]
    weights: Option<PathBuf>,

    /// Hash graphlets only.
    #[arg(long, default_value_t = false)]
    no_mnemonics: bool,

    /// Count each distinct feature once instead of tagging repeats.
    #[arg(long, default_value_t = false)]
    once: bool,
}

impl HasherArgs {
    fn apply(&self, settings: &mut SearchConfig) {
        if let Some(weights) = &self.weights {
            settings.hasher.weights_path = Some(weights.clone());
        }
        if self.no_mnemonics {
            settings.hasher.disable_mnemonics = true;
        }
        if self.once {
            settings.hasher.multiplicity = Multiplicity::Once;
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the SimHash of one or more flowgraph files.
    Hash {
        #[arg(required = true)]
        graphs: Vec<PathBuf>,
        #[command(flatten)]
        hasher: HasherArgs,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List the features extracted from a flowgraph with their weights.
    Features {
        graph: PathBuf,
        #[command(flatten)]
        hasher: HasherArgs,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Render a flowgraph as Graphviz DOT.
    Dot { graph: PathBuf },

    /// Print the executable id of a binary.
    ExecId { file: PathBuf },

    /// Create an empty index.
    CreateIndex {
        /// Index file. Defaults to the configured index path.
        index: Option<PathBuf>,
        /// log2 of the index capacity in bytes.
        #[arg(long)]
        capacity_bits: Option<u32>,
        /// Number of permuted copies kept per hash.
        #[arg(long)]
        permutations: Option<u32>,
    },

    /// Hash flowgraphs and add them to an index.
    Add {
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(required = true)]
        graphs: Vec<PathBuf>,
        /// Executable id (hex with 0x, or decimal).
        #[arg(long, value_parser = parse_u64, conflicts_with = "binary")]
        exec_id: Option<u64>,
        /// Derive the executable id from this binary.
        #[arg(long)]
        binary: Option<PathBuf>,
        /// Function address; defaults to the lowest block of the graph.
        #[arg(long, value_parser = parse_u64)]
        address: Option<u64>,
        /// Minimum branching nodes a function needs to be indexed.
        #[arg(long)]
        min_branching: Option<usize>,
        #[command(flatten)]
        hasher: HasherArgs,
    },

    /// Find the functions closest to a flowgraph.
    Query {
        #[arg(long)]
        index: Option<PathBuf>,
        graph: PathBuf,
        #[arg(short = 'n', long, default_value_t = 5)]
        count: usize,
        #[command(flatten)]
        hasher: HasherArgs,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show capacity and occupancy of an index.
    IndexInfo {
        index: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Add capacity to an index.
    GrowIndex {
        index: Option<PathBuf>,
        /// Bytes to add.
        #[arg(long, value_parser = parse_u64)]
        bytes: u64,
    },

    /// Print the permuted entries of an index.
    DumpIndex {
        index: Option<PathBuf>,
        /// Include every permutation table, not just the first.
        #[arg(long, default_value_t = false)]
        all: bool,
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Attach file and function names to an indexed function.
    Annotate {
        #[arg(long)]
        index: Option<PathBuf>,
        #[arg(long, value_parser = parse_u64)]
        exec_id: u64,
        #[arg(long, value_parser = parse_u64)]
        address: u64,
        #[arg(long)]
        file_name: String,
        #[arg(long)]
        function_name: String,
        #[arg(long, default_value_t = false)]
        vulnerable: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    let mut settings = load_settings(cli.config.as_deref())?;

    match cli.command {
        Command::Hash { graphs, hasher, json } => {
            hasher.apply(&mut settings);
            hash_command(&graphs, &settings.hasher, json)?
        }
        Command::Features { graph, hasher, json } => {
            hasher.apply(&mut settings);
            features_command(&graph, &settings.hasher, json)?
        }
        Command::Dot { graph } => dot_command(&graph)?,
        Command::ExecId { file } => exec_id_command(&file)?,
        Command::CreateIndex { index, capacity_bits, permutations } => {
            let path = index.unwrap_or_else(|| settings.index_path.clone());
            let options = IndexOptions::new(capacity_bits.unwrap_or(settings.capacity_bits))
                .with_permutations(permutations.unwrap_or(settings.permutations));
            create_index_command(&path, options)?
        }
        Command::Add { index, graphs, exec_id, binary, address, min_branching, hasher } => {
            hasher.apply(&mut settings);
            if let Some(min) = min_branching {
                settings.min_branching_nodes = min;
            }
            let executable_id = match (exec_id, binary) {
                (Some(id), _) => id,
                (None, Some(binary)) => simsearch::commands::exec_id(&binary)?,
                (None, None) => return Err(anyhow!("add needs --exec-id or --binary")),
            };
            let path = index.unwrap_or_else(|| settings.index_path.clone());
            add_command(&path, &graphs, executable_id, address, &settings)?
        }
        Command::Query { index, graph, count, hasher, json } => {
            hasher.apply(&mut settings);
            let path = index.unwrap_or_else(|| settings.index_path.clone());
            query_command(&path, &graph, count, &settings, json)?
        }
        Command::IndexInfo { index, json } => {
            index_info_command(&index.unwrap_or(settings.index_path), json)?
        }
        Command::GrowIndex { index, bytes } => {
            grow_index_command(&index.unwrap_or(settings.index_path), bytes)?
        }
        Command::DumpIndex { index, all, json } => {
            dump_index_command(&index.unwrap_or(settings.index_path), all, json)?
        }
        Command::Annotate { index, exec_id, address, file_name, function_name, vulnerable } => {
            let path = index.unwrap_or_else(|| settings.index_path.clone());
            let metadata = FunctionMetadata::new(file_name, function_name).with_vulnerable(vulnerable);
            annotate_command(&path, settings.metadata_path.clone(), exec_id, address, metadata)?
        }
    }

    Ok(())
}
