use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "boltpass",
    about = "Encrypted local credential vault",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to listing credentials when absent.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List stored credentials (passwords masked unless --reveal).
    List {
        #[arg(long)]
        reveal: bool,
    },
    /// Add a credential.
    Add {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
        #[arg(short, long, default_value = "")]
        notes: String,
    },
    /// Remove a credential by id.
    Remove { id: String },
    /// Write the vault as plain JSON to a file, or stdout when no file is given.
    Export {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Replace the vault with a previously exported JSON file.
    Import { path: PathBuf },
    /// Delete every stored credential.
    Clear {
        /// Required confirmation.
        #[arg(long)]
        yes: bool,
    },
    /// Print version and exit.
    Version,
    /// Run a health check against the configured storage.
    Health,
    /// Time store/flush/retrieve cycles against an in-memory vault.
    Stress {
        /// Largest snapshot size tested.
        #[arg(long, default_value_t = 1000)]
        max: usize,
        /// Number of increasing sizes between max/steps and max.
        #[arg(long, default_value_t = 5)]
        steps: usize,
        /// Also run repeated store/retrieve/clear batches of this size.
        #[arg(long)]
        batch: Option<usize>,
    },
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}
