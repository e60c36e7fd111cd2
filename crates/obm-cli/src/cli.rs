use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "obm",
    about = "Merge one-block files into fixed-size block bundles",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resume merging and serve premerged-block queries until Ctrl-C
    Run(RunArgs),
    /// Print the base block of the next bundle to produce
    NextBase(NextBaseArgs),
    /// Show the fields of a one-block filename
    ParseName(ParseNameArgs),
    /// Write a synthetic chain of one-block files
    Seed(SeedArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Directory holding one-block files
    #[arg(long)]
    pub source: Option<PathBuf>,
    /// Directory receiving bundles
    #[arg(long)]
    pub destination: Option<PathBuf>,
    #[arg(long)]
    pub chunk_size: Option<u64>,
    #[arg(long)]
    pub minimal_block_num: Option<u64>,
    /// Query server address
    #[arg(long)]
    pub bind: Option<SocketAddr>,
}

#[derive(Args)]
pub struct NextBaseArgs {
    /// Directory holding bundles
    #[arg(long)]
    pub destination: PathBuf,
    #[arg(long, default_value_t = 100)]
    pub chunk_size: u64,
    #[arg(long, default_value_t = 0)]
    pub minimal_block_num: u64,
}

#[derive(Args)]
pub struct ParseNameArgs {
    pub name: String,
}

#[derive(Args)]
pub struct SeedArgs {
    /// Directory to write one-block files into
    #[arg(long)]
    pub dir: PathBuf,
    /// First block number
    #[arg(long, default_value_t = 0)]
    pub from: u64,
    /// Number of blocks
    #[arg(long, default_value_t = 100)]
    pub count: u64,
    /// Also write a competing block at this number
    #[arg(long)]
    pub fork_at: Option<u64>,
}
