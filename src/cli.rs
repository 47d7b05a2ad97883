use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Command-line client for a remote task service.
/// Settings come from --config, ./.tt.toml, the user config directory and TT_* variables.
#[derive(Parser)]
#[command(name = "tt", version, about = "Task and subtask tracker for a remote task service")]
pub struct Cli {
    /// Base URL of the task service API (overrides server.base_url).
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Extra TOML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}
