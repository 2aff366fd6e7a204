use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "subdex",
    about = "Inspect and edit a watched subdirectory index",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Index file to operate on
    #[arg(short, long, global = true, default_value = "index.json")]
    pub index: PathBuf,

    /// TOML file with store settings
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List entries and the comment
    List,
    /// Add an entry
    Add(AddArgs),
    /// Remove an entry by id
    Remove(RemoveArgs),
    /// Remove every entry, keeping the comment
    Reset,
    /// Print the index every time it changes
    Watch,
    /// Print the effective store configuration
    Config,
}

#[derive(Args)]
pub struct AddArgs {
    pub id: String,
    /// Extra field as KEY=VALUE; VALUE is parsed as JSON, else taken as a string
    #[arg(short, long = "field", value_name = "KEY=VALUE")]
    pub fields: Vec<String>,
}

#[derive(Args)]
pub struct RemoveArgs {
    pub id: String,
}
