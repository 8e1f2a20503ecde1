use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use reconcile::PatchStatus;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "patchwork")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Keep source patches applied to vendored packages", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (defaults to ./patchwork.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Apply pending patches, resetting packages whose patches changed
    Apply(SelectArgs),

    /// Revert patched packages to their pristine state
    Undo(TargetArgs),

    /// Revert the selected packages, then apply their patches again
    Redo(SelectArgs),

    /// List every patch with its status
    List(ListArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Default)]
pub struct TargetArgs {
    /// Only touch these packages (repeatable; `*` wildcards, `!` excludes)
    #[arg(short, long = "target", value_name = "PACKAGE")]
    pub targets: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct SelectArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Only apply patches whose path contains this (repeatable; `*` wildcards, `!` excludes)
    #[arg(short, long = "filter", value_name = "PATTERN")]
    pub filters: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct ListArgs {
    /// Only show patches with this status (repeatable)
    #[arg(short, long)]
    pub status: Vec<PatchStatus>,

    /// Only show patches whose path contains this (repeatable)
    #[arg(short, long = "filter", value_name = "PATTERN")]
    pub filters: Vec<String>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}
