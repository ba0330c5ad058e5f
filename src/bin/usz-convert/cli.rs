use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "usz-convert",
    version,
    about = "Convert NIX EEG/iEEG recordings into NWB documents",
    long_about = "Convert per-session NIX containers into NWB documents, attaching subject\n\
                  metadata from in/metadata/participants.csv. Set $USZ_PROJECT_DIR or use\n\
                  --project-dir to point at the directory holding in/ and out/."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory holding in/ and out/
    #[arg(long, env = "USZ_PROJECT_DIR", global = true)]
    pub project_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Convert a single session
    Convert(SessionArgs),
    /// Convert every session found for a project
    Batch(ProjectArgs),
    /// List the source containers found for a project
    Discover(ProjectArgs),
    /// Print a summary of a source container
    Inspect(InspectArgs),
    /// Print a converted document
    Show(SessionArgs),
}

#[derive(Args)]
pub struct SessionArgs {
    /// Dataset/project name
    #[arg(long)]
    pub project: String,

    /// Participant number
    #[arg(long)]
    pub subject: u32,

    /// Session number
    #[arg(long)]
    pub session: u32,
}

#[derive(Args)]
pub struct ProjectArgs {
    /// Dataset/project name
    #[arg(long)]
    pub project: String,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Container file; resolved from --project/--subject/--session when omitted
    #[arg(long)]
    pub file: Option<PathBuf>,

    #[arg(long, requires_all = ["subject", "session"])]
    pub project: Option<String>,

    #[arg(long)]
    pub subject: Option<u32>,

    #[arg(long)]
    pub session: Option<u32>,
}
