use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ledgerbox")]
#[command(about = "Record ledger and work coordination for digitization batches", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the record coordination service
    Server(ServerArgs),
    /// Print the next record matching a state
    Next(NextArgs),
    /// Bulk query or transition record states
    States(StatesArgs),
    /// Merge another ledger into this one, newer wins
    Merges(MergesArgs),
    /// Partition a ledger into an active window plus masked remainder
    Frame(FrameArgs),
}

#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Address to bind the service to (overrides configuration)
    #[arg(long)]
    pub address: Option<SocketAddr>,
    /// Directory holding the ledger files (overrides configuration)
    #[arg(long)]
    pub ledger_dir: Option<PathBuf>,
    /// Configuration file to load instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct NextArgs {
    /// Ledger file
    pub path: PathBuf,
    /// State to look for (default: the open mark)
    #[arg(long)]
    pub state: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct StatesArgs {
    /// Ledger file
    pub path: PathBuf,
    /// Match records in exactly this state
    #[arg(long)]
    pub state: Option<String>,
    /// Match records containing this text
    #[arg(long)]
    pub text: Option<String>,
    /// Field searched by --text
    #[arg(long, default_value = "INFO")]
    pub text_field: String,
    /// Inclusive lower datetime bound
    #[arg(long)]
    pub from: Option<String>,
    /// Exclusive upper datetime bound
    #[arg(long)]
    pub to: Option<String>,
    /// Field holding the datetime (default: state time)
    #[arg(long)]
    pub dt_field: Option<String>,
    /// Datetime format of --from/--to and the field
    #[arg(long)]
    pub dt_format: Option<String>,
    /// State written to every match (default: the open mark)
    #[arg(long)]
    pub set_state: Option<String>,
    /// Persist the transition instead of only counting
    #[arg(long)]
    pub apply: bool,
    /// List matched records instead of only counting
    #[arg(long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug)]
pub struct MergesArgs {
    /// Ledger file merged into
    pub path: PathBuf,
    /// Ledger file merged from
    #[arg(long)]
    pub other: PathBuf,
    /// Only consider candidates in exactly this state
    #[arg(long)]
    pub require_state: Option<String>,
    /// Leave local records alone when the candidate is in this state
    #[arg(long, default_value = "n.a.")]
    pub ignore_state: String,
    /// Disable --ignore-state, overwrite from any candidate state
    #[arg(long)]
    pub no_ignore: bool,
    /// Do not append candidates with unknown identifiers
    #[arg(long)]
    pub no_append: bool,
    /// Persist the merge instead of only counting
    #[arg(long)]
    pub apply: bool,
    /// List every merge group instead of only counting
    #[arg(long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug)]
pub struct FrameArgs {
    /// Ledger file
    pub path: PathBuf,
    /// First record of the active window (1-based, inclusive)
    #[arg(long)]
    pub start: usize,
    /// Number of records in the active window
    #[arg(long, default_value_t = 1000)]
    pub size: usize,
    /// State written to records outside the window
    #[arg(long, default_value = "other_load")]
    pub mark: String,
    /// Sort the output by this field first
    #[arg(long)]
    pub sort_by: Option<String>,
}
