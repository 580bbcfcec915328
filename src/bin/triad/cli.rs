//! CLI definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use triad::Mode;

/// Triad - build, live-reload and packaging orchestrator for desktop apps
#[derive(Parser)]
#[command(name = "triad")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show error details
    #[arg(long, global = true, env = "TRIAD_DEBUG")]
    pub debug: bool,

    /// Path to Triad.toml (searched upwards by default)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Watch every target and run the host with live reload
    Dev,

    /// Build in preview mode and run the host
    Preview,

    /// Build in production mode and run the host
    Start,

    /// Build every target once without running anything
    Build(BuildArgs),

    /// Build in production mode and package the application
    Pack,

    /// Show resolved targets, environment and externals
    Inspect(InspectArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args)]
pub struct BuildArgs {
    /// Run mode (defaults to the mode in Triad.toml)
    #[arg(long)]
    pub mode: Option<Mode>,
}

#[derive(Args)]
pub struct InspectArgs {
    /// Run mode (defaults to the mode in Triad.toml)
    #[arg(long)]
    pub mode: Option<Mode>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}
