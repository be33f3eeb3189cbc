//! Argument definitions for the `papyrus` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "papyrus", version, about = "PDF document search engine")]
pub struct PapyrusArgs {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl PapyrusArgs {
    pub fn verbosity(&self) -> u8 {
        self.verbose
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve the search and upload API
    Serve(ServeArgs),
    /// Build the lexicon, forward index, barrels and stats cache from a corpus
    Build(BuildArgs),
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Root data directory
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Host to bind
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Documents per writer batch
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    /// Maximum seconds between writer flushes
    #[arg(long, default_value_t = 5)]
    pub flush_interval_secs: u64,

    /// PDF worker threads (default: hardware concurrency, minimum 4)
    #[arg(long)]
    pub workers: Option<usize>,

    /// Delta postings threshold that triggers a barrel merge
    #[arg(long, default_value_t = 5000)]
    pub delta_merge_threshold: usize,

    /// External tokenizer command (space-separated argv prefix)
    #[arg(long)]
    pub tokenizer: Option<String>,
}

#[derive(Debug, Args)]
pub struct BuildArgs {
    /// JSONL corpus to index
    #[arg(long)]
    pub corpus: PathBuf,

    /// Root data directory
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Minimum document frequency for lexicon admission
    #[arg(long, default_value_t = 1)]
    pub min_frequency: u32,

    /// Keep the bottom P% of document frequencies
    #[arg(long, default_value_t = 100)]
    pub max_frequency_percentile: u32,

    /// Replacement stopword file (one word per line)
    #[arg(long)]
    pub stopwords: Option<PathBuf>,

    /// Number of inverted-index barrels
    #[arg(long, default_value_t = 100)]
    pub num_barrels: usize,
}
