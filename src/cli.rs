use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "datakit",
    version,
    about = "datakit - Dataset versioning convenience layer over git",
    long_about = "Discovers files matching configured patterns, stages them into a per-user/per-dataset repository, commits, pushes to a remote, and triggers metadata collection."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Discover, stage, commit, push and post metadata for this project
    #[command(alias = "auto")]
    Collect {
        /// Per-project config file
        #[arg(long, default_value = "datakit.json")]
        config: PathBuf,

        /// Regenerate the config file even if one exists
        #[arg(long)]
        force_init: bool,
    },

    /// Create a new dataset repository (server-side plus working copy)
    Init {
        username: String,
        reponame: String,

        /// Destroy and recreate any pre-existing repository
        #[arg(long)]
        force: bool,

        /// Remote URL; `s3://` selects the object-store backend
        #[arg(long)]
        remote: Option<String>,
    },

    /// Clone an existing dataset repository
    Clone {
        url: String,

        /// Owner of the local working copy
        #[arg(long)]
        username: String,
    },

    /// List dataset repositories registered in the workspace
    List,

    /// Show the repository manager's configuration schema
    Config,

    /// Show working-copy status for the project in this directory
    Status,

    /// Show commit history for the project in this directory
    Log,

    /// Push the project in this directory to its remote
    Push,

    /// Stash local changes for the project in this directory
    Stash,

    /// Generate shell completion scripts
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
}
