use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "dyntree",
    about = "Hierarchical paths and links over a partition/sort-key table",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Snapshot file holding the tables
    #[arg(long, global = true, default_value = "dyntree.json")]
    pub store: PathBuf,

    /// Table name (overrides the config file)
    #[arg(long, global = true)]
    pub table: Option<String>,

    /// TOML file with tree settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Reserved delimiter (overrides the config file)
    #[arg(long, global = true)]
    pub delimiter: Option<String>,

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
    /// Create the table if it does not exist
    Init(InitArgs),
    /// Store a JSON object at a path
    Put(PutArgs),
    /// Make a path a link to another path
    Link(LinkArgs),
    /// Print the object at a path, following links
    Get(GetArgs),
    /// Print the immediate target of a link
    Readlink(ReadlinkArgs),
    /// List the children of a path
    Ls(LsArgs),
    /// Remove an object or link
    Rm(RmArgs),
}

#[derive(Args)]
pub struct InitArgs {}

#[derive(Args)]
pub struct PutArgs {
    /// Slash-separated path, e.g. /Accounts/12345
    pub path: String,
    /// JSON object to store
    pub json: String,
}

#[derive(Args)]
pub struct LinkArgs {
    pub path: String,
    pub target: String,
}

#[derive(Args)]
pub struct GetArgs {
    pub path: String,
}

#[derive(Args)]
pub struct ReadlinkArgs {
    pub path: String,
}

#[derive(Args)]
pub struct LsArgs {
    /// Directory to list; the root when omitted
    pub prefix: Option<String>,
}

#[derive(Args)]
pub struct RmArgs {
    pub path: String,
}
